use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use marine_eov_broker::coverage::{covers, covers_spatial, probe_url};
use marine_eov_broker::dataset::DatasetDescriptor;
use marine_eov_broker::domain::{DatasetKey, Eov, OutputFormat, QueryBounds, QueryDate};
use marine_eov_broker::erddap::ErddapClient;
use marine_eov_broker::error::BrokerError;
use marine_eov_broker::nvs::{NotationBinding, VocabularyEntry};
use marine_eov_broker::request::RequestDescriptor;
use marine_eov_broker::resolver::resolve_eov;
use marine_eov_broker::table::{DataTable, MetadataRow};
use marine_eov_broker::wms::{GridCapabilities, RawBoundingBox};

const SERVER: &str = "https://erddap.example.org/erddap";

#[derive(Default)]
struct MockData {
    rows: usize,
    fail: bool,
    table_calls: Mutex<Vec<String>>,
    byte_calls: Mutex<usize>,
}

impl ErddapClient for MockData {
    fn fetch_metadata(
        &self,
        _server: &str,
        _dataset_id: &str,
    ) -> Result<Vec<MetadataRow>, BrokerError> {
        Err(BrokerError::ErddapHttp("not implemented".to_string()))
    }

    fn list_datasets(&self, _server: &str) -> Result<Vec<String>, BrokerError> {
        Err(BrokerError::ErddapHttp("not implemented".to_string()))
    }

    fn fetch_table(&self, url: &str) -> Result<DataTable, BrokerError> {
        self.table_calls.lock().unwrap().push(url.to_string());
        if self.fail {
            return Err(BrokerError::ErddapStatus {
                status: 404,
                message: "Your query produced no matching results.".to_string(),
            });
        }
        Ok(DataTable {
            columns: vec!["time".to_string()],
            units: vec!["UTC".to_string()],
            rows: vec![vec!["2022-01-16T00:00:00Z".to_string()]; self.rows],
        })
    }

    fn fetch_capabilities(
        &self,
        _server: &str,
        _dataset_id: &str,
    ) -> Result<GridCapabilities, BrokerError> {
        Err(BrokerError::ErddapHttp("not implemented".to_string()))
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, BrokerError> {
        let mut guard = self.byte_calls.lock().unwrap();
        *guard += 1;
        Ok(url.as_bytes().to_vec())
    }
}

fn date(value: &str) -> QueryDate {
    value.parse().unwrap()
}

fn bounds(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> QueryBounds {
    QueryBounds {
        min_lon,
        min_lat,
        max_lon,
        max_lat,
    }
}

fn tabular(id: &str, parameters: &[(&str, &str)]) -> DatasetDescriptor {
    let mut rows = vec![MetadataRow::attribute("NC_GLOBAL", "cdm_data_type", "TimeSeries")];
    rows.extend(
        parameters
            .iter()
            .map(|(variable, urn)| MetadataRow::attribute(variable, "sdn_parameter_urn", urn)),
    );
    DatasetDescriptor::from_metadata(DatasetKey::new(SERVER, id), &rows, None)
}

fn gridded(
    id: &str,
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
    elevations: &[f64],
) -> DatasetDescriptor {
    let rows = vec![
        MetadataRow::attribute("NC_GLOBAL", "cdm_data_type", "Grid"),
        MetadataRow::attribute("TEMP", "sdn_parameter_urn", "SDN:P01::TEMPPR01"),
    ];
    let capabilities = GridCapabilities {
        bounding_box: Some(RawBoundingBox {
            min_x: Some(min_x),
            min_y: Some(min_y),
            max_x: Some(max_x),
            max_y: Some(max_y),
        }),
        time_values: vec![
            "2022-01-15T00:00:00Z".to_string(),
            "2022-02-15T00:00:00Z".to_string(),
        ],
        elevation_values: elevations.to_vec(),
    };
    DatasetDescriptor::from_metadata(DatasetKey::new(SERVER, id), &rows, Some(&capabilities))
}

fn binding(p01: &str, p02: Option<&str>) -> NotationBinding {
    NotationBinding {
        p01: p01.to_string(),
        p02: p02.map(str::to_string),
        label: None,
    }
}

#[test]
fn tabular_without_box_is_spatially_covered_anywhere() {
    let dataset = tabular("buoy", &[]);
    for query in [bounds(-180.0, -90.0, 180.0, 90.0), bounds(170.0, 80.0, 171.0, 81.0)] {
        assert!(covers_spatial(&dataset, &query));
    }
}

#[test]
fn rectangle_coverage() {
    let dataset = gridded("grid", 0.0, 0.0, 10.0, 10.0, &[]);
    assert!(!covers_spatial(&dataset, &bounds(20.0, 20.0, 30.0, 30.0)));
    assert!(covers_spatial(&dataset, &bounds(5.0, 5.0, 6.0, 6.0)));
    assert!(covers_spatial(&dataset, &bounds(-50.0, -50.0, 50.0, 50.0)));
}

#[test]
fn tabular_coverage_follows_probe() {
    let dataset = tabular("buoy", &[]);
    let window = bounds(-10.0, 30.0, 10.0, 50.0);
    let (start, end) = (date("2022-01-01"), date("2022-02-01"));

    let found = MockData {
        rows: 1,
        ..MockData::default()
    };
    assert!(covers(&found, &dataset, &start, &end, &window));
    assert_eq!(
        found.table_calls.lock().unwrap().as_slice(),
        &[probe_url(&dataset, &start, &end, &window)]
    );

    let empty = MockData::default();
    assert!(!covers(&empty, &dataset, &start, &end, &window));

    let failing = MockData {
        fail: true,
        ..MockData::default()
    };
    assert!(!covers(&failing, &dataset, &start, &end, &window));
}

#[test]
fn probe_asks_for_a_single_time_value() {
    let dataset = tabular("buoy", &[]);
    let url = probe_url(
        &dataset,
        &date("2022-01-01"),
        &date("2022-02-01"),
        &bounds(-10.0, 30.0, 10.0, 50.0),
    );
    assert_eq!(
        url,
        "https://erddap.example.org/erddap/tabledap/buoy.csv?time\
         &time%3E=2022-01-01&time%3C=2022-02-01\
         &latitude%3E=30&latitude%3C=50&longitude%3E=-10&longitude%3C=10\
         &orderByLimit(%22time/6months,1%22)"
    );
}

#[test]
fn gridded_coverage_needs_an_available_day() {
    let dataset = gridded("grid", -10.0, -10.0, 10.0, 10.0, &[]);
    let client = MockData::default();
    let window = bounds(-5.0, -5.0, 5.0, 5.0);
    assert!(covers(&client, &dataset, &date("2022-02-10"), &date("2022-02-20"), &window));
    let (start, end) = (date("2022-01-16"), date("2022-02-15"));
    let outside = bounds(20.0, 20.0, 30.0, 30.0);
    assert!(!covers(&client, &dataset, &start, &end, &outside));
    assert!(!covers(&client, &dataset, &date("2022-02-16"), &date("2022-03-01"), &window));
    assert!(!covers(&client, &dataset, &date("2022-01-10"), &date("2022-01-15"), &window));
    assert!(client.table_calls.lock().unwrap().is_empty());
}

#[test]
fn resolve_prefers_p01() {
    let dataset = tabular(
        "argo",
        &[("TEMP", "SDN:P01::TEMPPR01"), ("TEMP_GROUP", "SDN:P02::TEMP")],
    );
    let entry = VocabularyEntry {
        bindings: vec![binding("SDN:P01::TEMPPR01", Some("SDN:P02::TEMP"))],
    };
    assert_eq!(resolve_eov(&dataset, Eov::SeaTemperature, &entry), vec!["TEMP"]);
    assert_eq!(dataset.found_eov(Eov::SeaTemperature).as_deref(), Some("TEMP"));
}

#[test]
fn resolve_falls_back_to_p02() {
    let dataset = tabular("argo", &[("PSAL", "SDN:P02::PSAL")]);
    let entry = VocabularyEntry {
        bindings: vec![
            binding("SDN:P01::PSLTZZ01", Some("SDN:P02::PSAL")),
            binding("SDN:P01::PSALST01", None),
        ],
    };
    assert_eq!(resolve_eov(&dataset, Eov::Salinity, &entry), vec!["PSAL"]);
    assert_eq!(dataset.found_eov(Eov::Salinity).as_deref(), Some("PSAL"));
}

#[test]
fn resolve_without_match_records_nothing() {
    let dataset = tabular("argo", &[("TEMP", "SDN:P01::TEMPPR01")]);
    let entry = VocabularyEntry {
        bindings: vec![binding("SDN:P01::DOXYZZXX", Some("SDN:P02::DOXY"))],
    };
    assert!(resolve_eov(&dataset, Eov::Oxygen, &entry).is_empty());
    assert!(resolve_eov(&dataset, Eov::Oxygen, &VocabularyEntry::default()).is_empty());
    assert_eq!(dataset.found_eov(Eov::Oxygen), None);
}

#[test]
fn resolve_is_idempotent() {
    let dataset = tabular("argo", &[("TEMP", "SDN:P01::TEMPPR01"), ("TEMP2", "SDN:P01::TEMPST01")]);
    let entry = VocabularyEntry {
        bindings: vec![binding("SDN:P01::TEMPST01", None), binding("SDN:P01::TEMPPR01", None)],
    };
    let first = resolve_eov(&dataset, Eov::SeaTemperature, &entry);
    let recorded = dataset.found_eov(Eov::SeaTemperature);
    let second = resolve_eov(&dataset, Eov::SeaTemperature, &entry);
    assert_eq!(first, second);
    assert_eq!(first, vec!["TEMP", "TEMP2"]);
    assert_eq!(dataset.found_eov(Eov::SeaTemperature), recorded);
}

#[test]
fn gridded_bounds_are_clamped_one_by_one() {
    let dataset = Arc::new(gridded("grid", -10.0, -5.0, 10.0, 5.0, &[]));
    let request = RequestDescriptor::build(
        dataset,
        vec!["TEMP".to_string()],
        date("2022-01-16"),
        date("2022-01-17"),
        bounds(-20.0, -10.0, 20.0, -10.0),
        OutputFormat::Csv,
    )
    .unwrap();
    let effective = request.bounds();
    assert_eq!(effective.min_lon, -10.0);
    assert_eq!(effective.max_lon, 10.0);
    assert_eq!(effective.min_lat, -5.0);
    assert_eq!(effective.max_lat, -10.0);
}

#[test]
fn tabular_bounds_pass_through() {
    let dataset = Arc::new(tabular("buoy", &[]));
    let query = bounds(-200.0, -95.0, 200.0, 95.0);
    let request = RequestDescriptor::build(
        dataset,
        vec!["TEMP".to_string()],
        date("2022-01-16"),
        date("2022-01-17"),
        query,
        OutputFormat::Csv,
    )
    .unwrap();
    assert_eq!(request.bounds(), &query);
}

#[test]
fn tabular_url_round_trip() {
    let dataset = Arc::new(tabular("buoy", &[]));
    let variables = vec![
        "TEMP".to_string(),
        "PSAL adjusted".to_string(),
        "TEMP".to_string(),
        "DOXY".to_string(),
    ];
    let request = RequestDescriptor::build(
        dataset,
        variables,
        date("2022-01-16T12:00:00Z"),
        date("20220118"),
        bounds(-20.5, 35.25, 5.0, 62.0),
        OutputFormat::NcCf,
    )
    .unwrap();

    let url = url::Url::parse(request.query_url()).unwrap();
    assert_eq!(url.path(), "/erddap/tabledap/buoy.ncCF");
    let pairs = url.query_pairs().into_owned().collect::<Vec<_>>();
    assert_eq!(pairs[0].0, "time,latitude,longitude,TEMP,PSAL adjusted,DOXY");
    assert_eq!(pairs[0].1, "");
    let value = |key: &str| {
        pairs
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.clone())
            .unwrap()
    };
    assert_eq!(value("time>"), "2022-01-16T12:00:00Z");
    assert_eq!(value("time<"), "20220118");
    assert_eq!(value("latitude>").parse::<f64>().unwrap(), 35.25);
    assert_eq!(value("latitude<").parse::<f64>().unwrap(), 62.0);
    assert_eq!(value("longitude>").parse::<f64>().unwrap(), -20.5);
    assert_eq!(value("longitude<").parse::<f64>().unwrap(), 5.0);
}

#[test]
fn gridded_url_has_one_clause_per_variable() {
    let dataset = Arc::new(gridded("grid", -10.0, -5.0, 10.0, 5.0, &[-0.0, -5.0, -1000.0]));
    let request = RequestDescriptor::build(
        dataset,
        vec!["TEMP".to_string(), "PSAL".to_string()],
        date("2022-01-16"),
        date("2022-01-17"),
        bounds(-1.0, -2.0, 3.0, 4.0),
        OutputFormat::Nc,
    )
    .unwrap();
    assert_eq!(
        request.query_url(),
        "https://erddap.example.org/erddap/griddap/grid.nc?\
         TEMP[(2022-01-16):1:(2022-01-17)][(0):1:(1000)][(-2):1:(4)][(-1):1:(3)],\
         PSAL[(2022-01-16):1:(2022-01-17)][(0):1:(1000)][(-2):1:(4)][(-1):1:(3)]"
    );
}

#[test]
fn gridded_url_without_elevations_has_no_depth_subscript() {
    let dataset = Arc::new(gridded("surface", -10.0, -5.0, 10.0, 5.0, &[]));
    let request = RequestDescriptor::build(
        dataset,
        vec!["CHL".to_string()],
        date("2022-01-16"),
        date("2022-01-17"),
        bounds(0.0, 0.0, 1.0, 1.0),
        OutputFormat::Nc,
    )
    .unwrap();
    assert_eq!(
        request.query_url(),
        "https://erddap.example.org/erddap/griddap/surface.nc?\
         CHL[(2022-01-16):1:(2022-01-17)][(0):1:(1)][(0):1:(1)]"
    );
}

#[test]
fn empty_variable_list_is_rejected() {
    let dataset = Arc::new(tabular("buoy", &[]));
    let err = RequestDescriptor::build(
        dataset,
        Vec::new(),
        date("2022-01-16"),
        date("2022-01-17"),
        bounds(0.0, 0.0, 1.0, 1.0),
        OutputFormat::Csv,
    )
    .unwrap_err();
    assert_matches!(err, BrokerError::RequestBuild { dataset, .. } if dataset == "buoy");
}

#[test]
fn payload_is_fetched_once() {
    let dataset = Arc::new(tabular("buoy", &[]));
    let request = RequestDescriptor::build(
        dataset,
        vec!["TEMP".to_string()],
        date("2022-01-16"),
        date("2022-01-17"),
        bounds(0.0, 0.0, 1.0, 1.0),
        OutputFormat::Csv,
    )
    .unwrap();
    let client = MockData::default();
    let first = request.payload(&client).unwrap();
    let second = request.payload(&client).unwrap();
    assert_eq!(first, second);
    assert!(std::str::from_utf8(&first).unwrap().contains("/tabledap/buoy.nc?"));
    assert_eq!(*client.byte_calls.lock().unwrap(), 1);
}

#[test]
fn download_writes_requested_format() {
    let temp = tempfile::tempdir().unwrap();
    let destination = Utf8PathBuf::from_path_buf(temp.path().join("out/buoy.csv")).unwrap();
    let dataset = Arc::new(tabular("buoy", &[]));
    let request = RequestDescriptor::build(
        dataset,
        vec!["TEMP".to_string()],
        date("2022-01-16"),
        date("2022-01-17"),
        bounds(0.0, 0.0, 1.0, 1.0),
        OutputFormat::Nc,
    )
    .unwrap();
    let client = MockData::default();

    let path = request
        .download(&client, OutputFormat::Csv, Some(&destination))
        .unwrap();
    assert_eq!(path, destination);
    let written = std::fs::read_to_string(path.as_std_path()).unwrap();
    assert!(written.starts_with("https://erddap.example.org/erddap/tabledap/buoy.csv?"));
}
