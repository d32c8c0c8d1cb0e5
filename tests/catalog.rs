use std::collections::HashMap;
use std::sync::Mutex;

use marine_eov_broker::catalog::CatalogBuilder;
use marine_eov_broker::config::{DatasetSelection, ServerEntry};
use marine_eov_broker::domain::DatasetKey;
use marine_eov_broker::erddap::ErddapClient;
use marine_eov_broker::error::BrokerError;
use marine_eov_broker::table::{DataTable, MetadataRow};
use marine_eov_broker::wms::GridCapabilities;

#[derive(Default)]
struct MockCatalog {
    listings: HashMap<String, Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl MockCatalog {
    fn with_listing(mut self, server: &str, ids: &[&str]) -> Self {
        self.listings.insert(
            server.to_string(),
            ids.iter().map(|id| id.to_string()).collect(),
        );
        self
    }
}

impl ErddapClient for MockCatalog {
    fn fetch_metadata(
        &self,
        _server: &str,
        _dataset_id: &str,
    ) -> Result<Vec<MetadataRow>, BrokerError> {
        Err(BrokerError::ErddapHttp("not implemented".to_string()))
    }

    fn list_datasets(&self, server: &str) -> Result<Vec<String>, BrokerError> {
        self.calls.lock().unwrap().push(server.to_string());
        self.listings
            .get(server)
            .cloned()
            .ok_or_else(|| BrokerError::ErddapStatus {
                status: 503,
                message: "unavailable".to_string(),
            })
    }

    fn fetch_table(&self, _url: &str) -> Result<DataTable, BrokerError> {
        Err(BrokerError::ErddapHttp("not implemented".to_string()))
    }

    fn fetch_capabilities(
        &self,
        _server: &str,
        _dataset_id: &str,
    ) -> Result<GridCapabilities, BrokerError> {
        Err(BrokerError::ErddapHttp("not implemented".to_string()))
    }

    fn fetch_bytes(&self, _url: &str) -> Result<Vec<u8>, BrokerError> {
        Err(BrokerError::ErddapHttp("not implemented".to_string()))
    }
}

fn explicit(url: &str, ids: &[&str]) -> ServerEntry {
    ServerEntry {
        url: url.to_string(),
        datasets: DatasetSelection::Explicit(ids.iter().map(|id| id.to_string()).collect()),
    }
}

fn discover(url: &str) -> ServerEntry {
    ServerEntry {
        url: url.to_string(),
        datasets: DatasetSelection::Discover,
    }
}

#[test]
fn explicit_lists_need_no_listing() {
    let client = MockCatalog::default();
    let servers = [explicit("https://a.org/erddap", &["x", "y", "x"])];
    let keys = CatalogBuilder::build(&client, &servers);
    assert_eq!(
        keys,
        vec![
            DatasetKey::new("https://a.org/erddap", "x"),
            DatasetKey::new("https://a.org/erddap", "y"),
        ]
    );
    assert!(client.calls.lock().unwrap().is_empty());
}

#[test]
fn discovery_skips_all_datasets_and_duplicates() {
    let client = MockCatalog::default().with_listing(
        "http://erddap.emso.eu/erddap",
        &["allDatasets", "EMSO_Azores", "EMSO_Ligurian", "EMSO_Azores"],
    );
    let servers = [
        discover("http://erddap.emso.eu/erddap"),
        explicit("http://erddap.emso.eu/erddap", &["EMSO_Ligurian"]),
    ];
    let keys = CatalogBuilder::build(&client, &servers);
    let ids = keys.iter().map(|key| key.dataset_id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["EMSO_Ligurian", "EMSO_Azores"]);
}

#[test]
fn failed_listing_does_not_abort_other_servers() {
    let client = MockCatalog::default().with_listing("https://b.org/erddap", &["b1"]);
    let servers = [
        discover("https://down.org/erddap"),
        discover("https://b.org/erddap"),
        explicit("https://c.org/erddap", &["c1"]),
    ];
    let keys = CatalogBuilder::build(&client, &servers);
    assert_eq!(
        keys,
        vec![
            DatasetKey::new("https://c.org/erddap", "c1"),
            DatasetKey::new("https://b.org/erddap", "b1"),
        ]
    );
    assert_eq!(client.calls.lock().unwrap().len(), 2);
}
