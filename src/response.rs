use std::collections::BTreeMap;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::dataset::DatasetDescriptor;
use crate::domain::{Eov, OutputFormat};
use crate::erddap::ErddapClient;
use crate::error::BrokerError;
use crate::request::RequestDescriptor;
use crate::table::DataTable;

/// Axis columns kept next to the EOV variable in per-EOV tables.
const AXIS_COLUMNS: [&str; 5] = ["time", "depth", "elevation", "latitude", "longitude"];

/// One matched dataset of a submission.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEntry {
    pub dataset_id: String,
    pub server: String,
    pub query_url: String,
    pub global_attributes: BTreeMap<String, String>,
    /// Every requested EOV; empty when the dataset exposes no variable for it.
    pub eovs: BTreeMap<Eov, String>,
    #[serde(skip)]
    pub request: Arc<RequestDescriptor>,
}

impl ResponseEntry {
    fn new(request: Arc<RequestDescriptor>, requested: &[Eov]) -> Self {
        let dataset = request.dataset();
        let found = dataset.found_eovs();
        let eovs = requested
            .iter()
            .map(|eov| (*eov, found.get(eov).cloned().unwrap_or_default()))
            .collect();
        Self {
            dataset_id: dataset.name().to_string(),
            server: dataset.server().to_string(),
            query_url: request.query_url().to_string(),
            global_attributes: dataset.global_attributes().clone(),
            eovs,
            request,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseSummary {
    pub eovs: Vec<Eov>,
    pub results: Vec<ResponseEntry>,
}

/// Matched requests of one submission, keyed by dataset ID.
///
/// Entries are appended from the matching workers; each one is complete
/// before it is inserted.
pub struct BrokerResponse {
    eovs: Vec<Eov>,
    client: Arc<dyn ErddapClient>,
    entries: Mutex<BTreeMap<String, ResponseEntry>>,
}

impl std::fmt::Debug for BrokerResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BrokerResponse with {} results", self.len())
    }
}

impl BrokerResponse {
    pub fn new(eovs: Vec<Eov>, client: Arc<dyn ErddapClient>) -> Self {
        Self {
            eovs,
            client,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Adds a matched request. When two servers publish the same dataset ID,
    /// the server sorting first is kept so the outcome does not depend on arrival order.
    pub fn add(&self, request: Arc<RequestDescriptor>) {
        let entry = ResponseEntry::new(request, &self.eovs);
        let mut entries = self.entries.lock();
        match entries.get(&entry.dataset_id) {
            Some(existing) if existing.server <= entry.server => {
                warn!(
                    dataset = %entry.dataset_id,
                    kept = %existing.server,
                    dropped = %entry.server,
                    "dataset id published by several servers"
                );
            }
            _ => {
                debug!(dataset = %entry.dataset_id, "adding dataset to response");
                entries.insert(entry.dataset_id.clone(), entry);
            }
        }
    }

    pub fn requested_eovs(&self) -> &[Eov] {
        &self.eovs
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Matched dataset IDs, sorted.
    pub fn datasets(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<ResponseEntry> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn entry(&self, dataset_id: &str) -> Result<ResponseEntry, BrokerError> {
        self.entries
            .lock()
            .get(dataset_id)
            .cloned()
            .ok_or_else(|| BrokerError::UnknownDatasetId(dataset_id.to_string()))
    }

    pub fn request(&self, dataset_id: &str) -> Result<Arc<RequestDescriptor>, BrokerError> {
        Ok(self.entry(dataset_id)?.request)
    }

    pub fn dataset(&self, dataset_id: &str) -> Result<Arc<DatasetDescriptor>, BrokerError> {
        Ok(Arc::clone(self.request(dataset_id)?.dataset()))
    }

    pub fn dataset_eovs(&self, dataset_id: &str) -> Result<BTreeMap<Eov, String>, BrokerError> {
        Ok(self.entry(dataset_id)?.eovs)
    }

    pub fn query_table(&self, dataset_id: &str) -> Result<DataTable, BrokerError> {
        self.request(dataset_id)?.table(self.client.as_ref())
    }

    /// The result table reduced to the axes and the variable found for `eov`.
    pub fn query_eov_table(&self, dataset_id: &str, eov: Eov) -> Result<DataTable, BrokerError> {
        let entry = self.entry(dataset_id)?;
        let variable = entry
            .eovs
            .get(&eov)
            .filter(|variable| !variable.is_empty())
            .cloned()
            .or_else(|| entry.request.dataset().found_eov(eov))
            .ok_or_else(|| BrokerError::EovNotFound {
                dataset: dataset_id.to_string(),
                eov: eov.to_string(),
            })?;
        let table = entry.request.table(self.client.as_ref())?;
        let mut columns = AXIS_COLUMNS.to_vec();
        columns.push(variable.as_str());
        Ok(table.select(&columns))
    }

    pub fn query_payload(&self, dataset_id: &str) -> Result<Arc<[u8]>, BrokerError> {
        self.request(dataset_id)?.payload(self.client.as_ref())
    }

    pub fn download(
        &self,
        dataset_id: &str,
        format: OutputFormat,
        destination: Option<&Utf8Path>,
    ) -> Result<Utf8PathBuf, BrokerError> {
        self.request(dataset_id)?
            .download(self.client.as_ref(), format, destination)
    }

    pub fn summary(&self) -> ResponseSummary {
        ResponseSummary {
            eovs: self.eovs.clone(),
            results: self.entries(),
        }
    }
}
