use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::BrokerError;
use crate::table::{DataTable, MetadataRow, parse_catalog_csv, parse_metadata_csv};
use crate::wms::{GridCapabilities, parse_capabilities};

/// Transport to ERDDAP servers. Every call is a single attempt.
pub trait ErddapClient: Send + Sync {
    fn fetch_metadata(
        &self,
        server: &str,
        dataset_id: &str,
    ) -> Result<Vec<MetadataRow>, BrokerError>;
    fn list_datasets(&self, server: &str) -> Result<Vec<String>, BrokerError>;
    fn fetch_table(&self, url: &str) -> Result<DataTable, BrokerError>;
    fn fetch_capabilities(
        &self,
        server: &str,
        dataset_id: &str,
    ) -> Result<GridCapabilities, BrokerError>;
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, BrokerError>;
}

pub fn metadata_url(server: &str, dataset_id: &str) -> String {
    format!("{server}/info/{dataset_id}/index.csv")
}

pub fn catalog_url(server: &str) -> String {
    format!("{server}/info/index.csv")
}

pub fn capabilities_url(server: &str, dataset_id: &str) -> String {
    format!("{server}/wms/{dataset_id}/request?service=WMS&request=GetCapabilities&version=1.3.0")
}

#[derive(Clone)]
pub struct ErddapHttpClient {
    client: Client,
}

impl ErddapHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, BrokerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("eov-broker/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| BrokerError::ErddapHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| BrokerError::ErddapHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn get(&self, url: &str) -> Result<Vec<u8>, BrokerError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| BrokerError::ErddapHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "ERDDAP request failed".to_string());
            return Err(BrokerError::ErddapStatus { status, message });
        }
        let bytes = response
            .bytes()
            .map_err(|err| BrokerError::ErddapHttp(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

impl ErddapClient for ErddapHttpClient {
    fn fetch_metadata(
        &self,
        server: &str,
        dataset_id: &str,
    ) -> Result<Vec<MetadataRow>, BrokerError> {
        let content = self.get(&metadata_url(server, dataset_id))?;
        parse_metadata_csv(&content)
    }

    fn list_datasets(&self, server: &str) -> Result<Vec<String>, BrokerError> {
        let content = self.get(&catalog_url(server))?;
        parse_catalog_csv(&content)
    }

    fn fetch_table(&self, url: &str) -> Result<DataTable, BrokerError> {
        let content = self.get(url)?;
        DataTable::from_erddap_csv(&content)
    }

    fn fetch_capabilities(
        &self,
        server: &str,
        dataset_id: &str,
    ) -> Result<GridCapabilities, BrokerError> {
        let content = self.get(&capabilities_url(server, dataset_id))?;
        parse_capabilities(&content)
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, BrokerError> {
        self.get(url)
    }
}
