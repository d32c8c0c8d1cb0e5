use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;
use url::form_urlencoded::byte_serialize;

use crate::dataset::DatasetDescriptor;
use crate::domain::{OutputFormat, Protocol, QueryBounds, QueryDate};
use crate::erddap::ErddapClient;
use crate::error::BrokerError;
use crate::table::DataTable;

/// A data request against one matched dataset.
///
/// The query URL is rendered once at construction. The `nc` payload is
/// fetched at most once and shared afterwards.
#[derive(Debug)]
pub struct RequestDescriptor {
    dataset: Arc<DatasetDescriptor>,
    variables: Vec<String>,
    bounds: QueryBounds,
    start: QueryDate,
    end: QueryDate,
    output_format: OutputFormat,
    query_url: String,
    payload: Mutex<Option<Arc<[u8]>>>,
}

impl RequestDescriptor {
    pub fn build(
        dataset: Arc<DatasetDescriptor>,
        variables: Vec<String>,
        start: QueryDate,
        end: QueryDate,
        bounds: QueryBounds,
        output_format: OutputFormat,
    ) -> Result<Self, BrokerError> {
        let mut distinct = Vec::with_capacity(variables.len());
        for variable in variables {
            if !distinct.contains(&variable) {
                distinct.push(variable);
            }
        }
        let bounds = effective_bounds(&dataset, &bounds);
        let mut request = Self {
            dataset,
            variables: distinct,
            bounds,
            start,
            end,
            output_format,
            query_url: String::new(),
            payload: Mutex::new(None),
        };
        request.query_url = request.url_for(output_format)?;
        Ok(request)
    }

    pub fn dataset(&self) -> &Arc<DatasetDescriptor> {
        &self.dataset
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Bounds after clamping to the dataset's grid.
    pub fn bounds(&self) -> &QueryBounds {
        &self.bounds
    }

    pub fn start(&self) -> &QueryDate {
        &self.start
    }

    pub fn end(&self) -> &QueryDate {
        &self.end
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    pub fn query_url(&self) -> &str {
        &self.query_url
    }

    /// The same request rendered for another ERDDAP file type.
    pub fn url_for(&self, format: OutputFormat) -> Result<String, BrokerError> {
        if self.variables.is_empty() {
            return Err(self.build_error("no variables to request"));
        }
        if let Some(variable) = self.variables.iter().find(|name| name.trim().is_empty()) {
            return Err(self.build_error(&format!("invalid variable name {variable:?}")));
        }
        let url = match self.dataset.protocol() {
            Protocol::Tabular => self.tabular_url(format),
            Protocol::Gridded => self.gridded_url(format),
        };
        Ok(url)
    }

    fn tabular_url(&self, format: OutputFormat) -> String {
        let variables = self
            .variables
            .iter()
            .map(|name| byte_serialize(name.as_bytes()).collect::<String>())
            .collect::<Vec<_>>()
            .join("%2C");
        format!(
            "{url}.{format}?time%2Clatitude%2Clongitude%2C{variables}\
             &time%3E={start}&time%3C={end}\
             &latitude%3E={min_lat}&latitude%3C={max_lat}\
             &longitude%3E={min_lon}&longitude%3C={max_lon}",
            url = self.dataset.data_url(),
            start = self.start,
            end = self.end,
            min_lat = self.bounds.min_lat,
            max_lat = self.bounds.max_lat,
            min_lon = self.bounds.min_lon,
            max_lon = self.bounds.max_lon,
        )
    }

    fn gridded_url(&self, format: OutputFormat) -> String {
        let elevations = self.dataset.elevation_grid_values();
        let elevation = match (elevations.first(), elevations.last()) {
            (Some(first), Some(last)) => format!("[({first}):1:({last})]"),
            _ => String::new(),
        };
        let clauses = self
            .variables
            .iter()
            .map(|variable| {
                format!(
                    "{variable}[({start}):1:({end})]{elevation}\
                     [({min_lat}):1:({max_lat})][({min_lon}):1:({max_lon})]",
                    start = self.start,
                    end = self.end,
                    min_lat = self.bounds.min_lat,
                    max_lat = self.bounds.max_lat,
                    min_lon = self.bounds.min_lon,
                    max_lon = self.bounds.max_lon,
                )
            })
            .collect::<Vec<_>>()
            .join(",");
        format!("{}.{format}?{clauses}", self.dataset.data_url())
    }

    fn build_error(&self, message: &str) -> BrokerError {
        BrokerError::RequestBuild {
            dataset: self.dataset.name().to_string(),
            message: message.to_string(),
        }
    }

    /// The request as NetCDF, fetched on first use.
    pub fn payload<C>(&self, client: &C) -> Result<Arc<[u8]>, BrokerError>
    where
        C: ErddapClient + ?Sized,
    {
        let mut cached = self.payload.lock();
        if let Some(bytes) = cached.as_ref() {
            return Ok(Arc::clone(bytes));
        }
        let bytes: Arc<[u8]> = client.fetch_bytes(&self.url_for(OutputFormat::Nc)?)?.into();
        *cached = Some(Arc::clone(&bytes));
        Ok(bytes)
    }

    /// The request as a table, via the `csv` rendering.
    pub fn table<C>(&self, client: &C) -> Result<DataTable, BrokerError>
    where
        C: ErddapClient + ?Sized,
    {
        client.fetch_table(&self.url_for(OutputFormat::Csv)?)
    }

    /// Writes the request rendered as `format` to `destination`, or to
    /// `<dataset>-<unix time>.<format>` in the current directory.
    pub fn download<C>(
        &self,
        client: &C,
        format: OutputFormat,
        destination: Option<&Utf8Path>,
    ) -> Result<Utf8PathBuf, BrokerError>
    where
        C: ErddapClient + ?Sized,
    {
        let path = match destination {
            Some(path) => path.to_path_buf(),
            None => Utf8PathBuf::from(format!(
                "{}-{}.{}",
                self.dataset.name(),
                chrono::Utc::now().timestamp(),
                format
            )),
        };
        let bytes = match format {
            OutputFormat::Nc => self.payload(client)?.to_vec(),
            _ => client.fetch_bytes(&self.url_for(format)?)?,
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| BrokerError::Filesystem(err.to_string()))?;
        }
        fs::write(&path, bytes).map_err(|err| BrokerError::Filesystem(err.to_string()))?;
        Ok(path)
    }
}

/// Gridded requests may not leave the dataset's box, so each bound is pulled
/// back inside it. Tabular requests keep the bounds as given.
pub fn effective_bounds(dataset: &DatasetDescriptor, bounds: &QueryBounds) -> QueryBounds {
    let dataset_box = match (dataset.protocol(), dataset.bounding_box()) {
        (Protocol::Gridded, Some(dataset_box)) => dataset_box,
        _ => return *bounds,
    };
    QueryBounds {
        min_lon: if bounds.min_lon < dataset_box.min_lon {
            dataset_box.min_lon
        } else {
            bounds.min_lon
        },
        min_lat: if bounds.min_lat < dataset_box.min_lat {
            dataset_box.min_lat
        } else {
            bounds.min_lat
        },
        max_lon: if bounds.max_lon > dataset_box.max_lon {
            dataset_box.max_lon
        } else {
            bounds.max_lon
        },
        max_lat: if bounds.max_lat > dataset_box.max_lat {
            dataset_box.max_lat
        } else {
            bounds.max_lat
        },
    }
}
