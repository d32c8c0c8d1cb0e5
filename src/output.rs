use std::io::{self, Write};

use serde::Serialize;

use crate::dataset::DatasetSummary;
use crate::response::BrokerResponse;

#[derive(Debug, Clone, Serialize)]
pub struct DatasetListing {
    pub datasets: Vec<DatasetSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub dataset_id: String,
    pub format: String,
    pub path: String,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_response(response: &BrokerResponse) -> io::Result<()> {
        Self::print_json(&response.summary())
    }

    pub fn print_datasets(listing: &DatasetListing) -> io::Result<()> {
        Self::print_json(listing)
    }

    pub fn print_download(result: &DownloadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn to_json<T: Serialize>(value: &T) -> io::Result<String> {
        serde_json::to_string_pretty(value).map_err(io::Error::other)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = Self::to_json(value)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
