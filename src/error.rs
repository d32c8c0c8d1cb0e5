use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum BrokerError {
    #[error(
        "input date {0} did not match any of the accepted formats: \
         YYYYMMDDThhmmssZ, YYYY-MM-DDThh:mm:ssZ, YYYYMMDDThh:mm:ssZ, \
         YYYY-MM-DDThhmmssZ, YYYYMMDD, YYYY-MM-DD"
    )]
    InvalidDateFormat(String),

    #[error("invalid spatial bound {0}: provide float-convertible values")]
    InvalidSpatialBounds(String),

    #[error("output format {0} does not match any of: csv, geoJson, json, nc, ncCF, odvTxt")]
    InvalidOutputFormat(String),

    #[error(
        "EOV {0} does not match any of: \
         EV_OXY, EV_SEATEMP, EV_SALIN, EV_CURR, EV_CHLA, EV_CO2, EV_NUTS"
    )]
    InvalidEov(String),

    #[error("failed to load metadata for {dataset}: {message}")]
    MetadataFetch { dataset: String, message: String },

    #[error("failed to load WMS capabilities for {dataset}: {message}")]
    CapabilityFetch { dataset: String, message: String },

    #[error("failed to list datasets of {server}: {message}")]
    CatalogListing { server: String, message: String },

    #[error("coverage probe failed: {0}")]
    CoverageProbe(String),

    #[error("failed to build request for {dataset}: {message}")]
    RequestBuild { dataset: String, message: String },

    #[error("dataset id {0} was not found in the response")]
    UnknownDatasetId(String),

    #[error("dataset {dataset} exposes no variable for {eov}")]
    EovNotFound { dataset: String, eov: String },

    #[error("vocabulary request failed: {0}")]
    VocabularyHttp(String),

    #[error("vocabulary server returned status {status}: {message}")]
    VocabularyStatus { status: u16, message: String },

    #[error("failed to parse SPARQL results: {0}")]
    VocabularyParse(String),

    #[error("ERDDAP request failed: {0}")]
    ErddapHttp(String),

    #[error("ERDDAP returned status {status}: {message}")]
    ErddapStatus { status: u16, message: String },

    #[error("failed to parse ERDDAP table: {0}")]
    TableParse(String),

    #[error("failed to parse WMS capabilities: {0}")]
    CapabilityParse(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),
}

impl BrokerError {
    /// Errors caused by the caller's query arguments, raised before any work is dispatched.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            BrokerError::InvalidDateFormat(_)
                | BrokerError::InvalidSpatialBounds(_)
                | BrokerError::InvalidOutputFormat(_)
                | BrokerError::InvalidEov(_)
        )
    }
}
