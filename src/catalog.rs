use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::{DatasetSelection, ServerEntry};
use crate::domain::DatasetKey;
use crate::erddap::ErddapClient;

/// Pseudo-dataset every ERDDAP server lists in its catalog.
pub const ALL_DATASETS_ID: &str = "allDatasets";

pub struct CatalogBuilder;

impl CatalogBuilder {
    /// Resolves the servers to a deduplicated list of datasets.
    ///
    /// Explicit lists are taken first, in configuration order; discovered
    /// datasets follow. A server whose catalog cannot be listed contributes nothing.
    pub fn build<C>(client: &C, servers: &[ServerEntry]) -> Vec<DatasetKey>
    where
        C: ErddapClient + ?Sized,
    {
        let mut keys = Vec::new();
        let mut seen = HashSet::new();

        for server in servers {
            if let DatasetSelection::Explicit(ids) = &server.datasets {
                for id in ids {
                    push_unique(&mut keys, &mut seen, DatasetKey::new(&server.url, id));
                }
            }
        }

        for server in servers {
            if server.datasets != DatasetSelection::Discover {
                continue;
            }
            let start = Instant::now();
            match client.list_datasets(&server.url) {
                Ok(ids) => {
                    for id in ids.into_iter().filter(|id| id != ALL_DATASETS_ID) {
                        push_unique(&mut keys, &mut seen, DatasetKey::new(&server.url, id));
                    }
                    debug!(
                        server = %server.url,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "listed server datasets"
                    );
                }
                Err(err) => {
                    warn!(
                        server = %server.url,
                        error = %err,
                        "skipping server, catalog listing failed"
                    );
                }
            }
        }

        keys
    }
}

fn push_unique(keys: &mut Vec<DatasetKey>, seen: &mut HashSet<DatasetKey>, key: DatasetKey) {
    if seen.insert(key.clone()) {
        keys.push(key);
    }
}
