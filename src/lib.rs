pub mod broker;
pub mod catalog;
pub mod config;
pub mod coverage;
pub mod dataset;
pub mod domain;
pub mod erddap;
pub mod error;
pub mod nvs;
pub mod output;
pub mod request;
pub mod resolver;
pub mod response;
pub mod table;
pub mod wms;
