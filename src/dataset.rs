use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::domain::{BoundingBox, DatasetKey, Eov, Protocol};
use crate::erddap::ErddapClient;
use crate::error::BrokerError;
use crate::table::MetadataRow;
use crate::wms::GridCapabilities;

pub const GLOBAL_ATTRIBUTES: &str = "NC_GLOBAL";
const CDM_DATA_TYPE: &str = "cdm_data_type";
const SDN_PARAMETER_URN: &str = "sdn_parameter_urn";

/// A dataset hosted on one ERDDAP server, with its metadata scanned once into typed lookups.
///
/// Only `found_eovs` changes after construction, and it only grows.
#[derive(Debug)]
pub struct DatasetDescriptor {
    key: DatasetKey,
    protocol: Protocol,
    data_url: String,
    bounding_box: Option<BoundingBox>,
    parameter_index: BTreeMap<String, String>,
    global_attributes: BTreeMap<String, String>,
    time_grid_values: BTreeSet<String>,
    elevation_grid_values: Vec<f64>,
    found_eovs: Mutex<BTreeMap<Eov, String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub server: String,
    pub dataset_id: String,
    pub protocol: Protocol,
    pub data_url: String,
    pub bounding_box: Option<BoundingBox>,
    pub parameters: usize,
    pub time_values: usize,
    pub elevation_values: usize,
}

impl DatasetDescriptor {
    /// Fetches the metadata table and, for gridded datasets, the WMS capabilities.
    pub fn load<C>(client: &C, key: DatasetKey) -> Result<Self, BrokerError>
    where
        C: ErddapClient + ?Sized,
    {
        let start = Instant::now();
        let rows = client
            .fetch_metadata(&key.server, &key.dataset_id)
            .map_err(|err| BrokerError::MetadataFetch {
                dataset: key.dataset_id.clone(),
                message: err.to_string(),
            })?;

        let protocol = Protocol::from_cdm_data_type(cdm_data_type(&rows));
        let capabilities = match protocol {
            Protocol::Gridded => Some(
                client
                    .fetch_capabilities(&key.server, &key.dataset_id)
                    .map_err(|err| BrokerError::CapabilityFetch {
                        dataset: key.dataset_id.clone(),
                        message: err.to_string(),
                    })?,
            ),
            Protocol::Tabular => None,
        };

        let descriptor = Self::from_metadata(key, &rows, capabilities.as_ref());
        debug!(
            dataset = %descriptor.name(),
            protocol = %descriptor.protocol,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "loaded dataset"
        );
        Ok(descriptor)
    }

    /// Builds a descriptor from already fetched documents.
    /// Capabilities are ignored for tabular datasets.
    pub fn from_metadata(
        key: DatasetKey,
        rows: &[MetadataRow],
        capabilities: Option<&GridCapabilities>,
    ) -> Self {
        let protocol = Protocol::from_cdm_data_type(cdm_data_type(rows));
        let data_url = format!("{}/{}/{}", key.server, protocol.path_segment(), key.dataset_id);

        let mut parameter_index = BTreeMap::new();
        let mut global_attributes = BTreeMap::new();
        for row in rows {
            if row.attribute_name == SDN_PARAMETER_URN {
                parameter_index.insert(row.value.clone(), row.variable_name.clone());
            }
            if row.variable_name == GLOBAL_ATTRIBUTES && !row.attribute_name.is_empty() {
                global_attributes.insert(row.attribute_name.clone(), row.value.clone());
            }
        }

        let mut bounding_box = None;
        let mut time_grid_values = BTreeSet::new();
        let mut elevation_grid_values = Vec::new();
        if protocol == Protocol::Gridded {
            let capabilities = capabilities.cloned().unwrap_or_default();
            bounding_box = Some(grid_bounding_box(&capabilities));
            time_grid_values = capabilities
                .time_values
                .iter()
                .map(|value| value.chars().take(10).collect::<String>())
                .collect();
            elevation_grid_values = capabilities
                .elevation_values
                .iter()
                .map(|value| value.abs())
                .collect();
            debug!(
                dataset = %key.dataset_id,
                time_values = time_grid_values.len(),
                elevation_values = elevation_grid_values.len(),
                "read griddap WMS dimensions"
            );
        }

        Self {
            key,
            protocol,
            data_url,
            bounding_box,
            parameter_index,
            global_attributes,
            time_grid_values,
            elevation_grid_values,
            found_eovs: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn key(&self) -> &DatasetKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.dataset_id
    }

    pub fn server(&self) -> &str {
        &self.key.server
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    pub fn bounding_box(&self) -> Option<&BoundingBox> {
        self.bounding_box.as_ref()
    }

    /// Controlled-vocabulary notation to the variable exposing it.
    pub fn parameter_index(&self) -> &BTreeMap<String, String> {
        &self.parameter_index
    }

    pub fn global_attributes(&self) -> &BTreeMap<String, String> {
        &self.global_attributes
    }

    /// Available days (`YYYY-MM-DD`) of a gridded dataset.
    pub fn time_grid_values(&self) -> &BTreeSet<String> {
        &self.time_grid_values
    }

    /// Depth magnitudes of a gridded dataset, in server order.
    pub fn elevation_grid_values(&self) -> &[f64] {
        &self.elevation_grid_values
    }

    pub fn found_eov(&self, eov: Eov) -> Option<String> {
        self.found_eovs.lock().get(&eov).cloned()
    }

    pub fn found_eovs(&self) -> BTreeMap<Eov, String> {
        self.found_eovs.lock().clone()
    }

    /// Records `variable` for `eov` unless a variable is already recorded.
    /// Returns whether it was stored.
    pub fn record_found_eov(&self, eov: Eov, variable: &str) -> bool {
        let mut found = self.found_eovs.lock();
        if found.contains_key(&eov) {
            return false;
        }
        found.insert(eov, variable.to_string());
        true
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            server: self.key.server.clone(),
            dataset_id: self.key.dataset_id.clone(),
            protocol: self.protocol,
            data_url: self.data_url.clone(),
            bounding_box: self.bounding_box,
            parameters: self.parameter_index.len(),
            time_values: self.time_grid_values.len(),
            elevation_values: self.elevation_grid_values.len(),
        }
    }
}

fn cdm_data_type(rows: &[MetadataRow]) -> Option<&str> {
    rows.iter()
        .find(|row| row.attribute_name == CDM_DATA_TYPE)
        .map(|row| row.value.trim())
}

fn grid_bounding_box(capabilities: &GridCapabilities) -> BoundingBox {
    let raw = capabilities.bounding_box.unwrap_or_default();
    BoundingBox {
        min_lon: raw.min_x.unwrap_or(BoundingBox::GLOBE.min_lon),
        max_lon: raw.max_x.unwrap_or(BoundingBox::GLOBE.max_lon),
        min_lat: raw.min_y.unwrap_or(BoundingBox::GLOBE.min_lat),
        max_lat: raw.max_y.unwrap_or(BoundingBox::GLOBE.max_lat),
    }
}
