use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::BrokerError;

/// Essential Ocean Variables the broker knows how to resolve, identified by their A05 notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Eov {
    #[serde(rename = "EV_OXY")]
    Oxygen,
    #[serde(rename = "EV_SEATEMP")]
    SeaTemperature,
    #[serde(rename = "EV_SALIN")]
    Salinity,
    #[serde(rename = "EV_CURR")]
    Currents,
    #[serde(rename = "EV_CHLA")]
    Chlorophyll,
    #[serde(rename = "EV_CO2")]
    CarbonDioxide,
    #[serde(rename = "EV_NUTS")]
    Nutrients,
}

impl Eov {
    pub const ALL: [Eov; 7] = [
        Eov::Oxygen,
        Eov::SeaTemperature,
        Eov::Salinity,
        Eov::Currents,
        Eov::Chlorophyll,
        Eov::CarbonDioxide,
        Eov::Nutrients,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Eov::Oxygen => "EV_OXY",
            Eov::SeaTemperature => "EV_SEATEMP",
            Eov::Salinity => "EV_SALIN",
            Eov::Currents => "EV_CURR",
            Eov::Chlorophyll => "EV_CHLA",
            Eov::CarbonDioxide => "EV_CO2",
            Eov::Nutrients => "EV_NUTS",
        }
    }
}

impl fmt::Display for Eov {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Eov {
    type Err = BrokerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Eov::ALL
            .into_iter()
            .find(|eov| eov.as_str() == value)
            .ok_or_else(|| BrokerError::InvalidEov(value.to_string()))
    }
}

/// ERDDAP file types a request can be rendered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputFormat {
    #[serde(rename = "csv")]
    Csv,
    #[serde(rename = "geoJson")]
    GeoJson,
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "nc")]
    Nc,
    #[serde(rename = "ncCF")]
    NcCf,
    #[serde(rename = "odvTxt")]
    OdvTxt,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 6] = [
        OutputFormat::Csv,
        OutputFormat::GeoJson,
        OutputFormat::Json,
        OutputFormat::Nc,
        OutputFormat::NcCf,
        OutputFormat::OdvTxt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::GeoJson => "geoJson",
            OutputFormat::Json => "json",
            OutputFormat::Nc => "nc",
            OutputFormat::NcCf => "ncCF",
            OutputFormat::OdvTxt => "odvTxt",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = BrokerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        OutputFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == value)
            .ok_or_else(|| BrokerError::InvalidOutputFormat(value.to_string()))
    }
}

/// ERDDAP access protocol of a dataset, chosen from its `cdm_data_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tabular,
    Gridded,
}

impl Protocol {
    pub fn from_cdm_data_type(value: Option<&str>) -> Self {
        match value {
            Some("Grid") => Protocol::Gridded,
            _ => Protocol::Tabular,
        }
    }

    pub fn path_segment(&self) -> &'static str {
        match self {
            Protocol::Tabular => "tabledap",
            Protocol::Gridded => "griddap",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Axis-aligned lon/lat rectangle. No handling of the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub const GLOBE: BoundingBox = BoundingBox {
        min_lon: -180.0,
        max_lon: 180.0,
        min_lat: -90.0,
        max_lat: 90.0,
    };

    /// True when the two closed rectangles share at least one point.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }

    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.min_lon
            && other.max_lon <= self.max_lon
            && self.min_lat <= other.min_lat
            && other.max_lat <= self.max_lat
    }
}

impl From<QueryBounds> for BoundingBox {
    fn from(value: QueryBounds) -> Self {
        Self {
            min_lon: value.min_lon,
            max_lon: value.max_lon,
            min_lat: value.min_lat,
            max_lat: value.max_lat,
        }
    }
}

const DATE_TIME_FORMATS: [&str; 4] = [
    "%Y%m%dT%H%M%SZ",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y%m%dT%H:%M:%SZ",
    "%Y-%m-%dT%H%M%SZ",
];

const DATE_FORMATS: [&str; 2] = ["%Y%m%d", "%Y-%m-%d"];

/// A query date kept verbatim for URLs, alongside its parsed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDate {
    raw: String,
    parsed: NaiveDateTime,
}

impl QueryDate {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn date_time(&self) -> NaiveDateTime {
        self.parsed
    }
}

impl fmt::Display for QueryDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for QueryDate {
    type Err = BrokerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if !has_plain_year(value) {
            return Err(BrokerError::InvalidDateFormat(value.to_string()));
        }
        let parsed = DATE_TIME_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
            .or_else(|| {
                DATE_FORMATS.iter().find_map(|format| {
                    NaiveDate::parse_from_str(value, format)
                        .ok()
                        .and_then(|date| date.and_hms_opt(0, 0, 0))
                })
            })
            .ok_or_else(|| BrokerError::InvalidDateFormat(value.to_string()))?;
        Ok(Self {
            raw: value.to_string(),
            parsed,
        })
    }
}

/// Every accepted pattern starts with an unsigned four-digit year. chrono's `%Y`
/// also takes a sign followed by more digits.
fn has_plain_year(value: &str) -> bool {
    value
        .as_bytes()
        .get(..4)
        .is_some_and(|year| year.iter().all(u8::is_ascii_digit))
}

/// The four requested spatial bounds, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueryBounds {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl QueryBounds {
    pub fn parse(
        min_lon: &str,
        min_lat: &str,
        max_lon: &str,
        max_lat: &str,
    ) -> Result<Self, BrokerError> {
        Ok(Self {
            min_lon: parse_bound(min_lon)?,
            min_lat: parse_bound(min_lat)?,
            max_lon: parse_bound(max_lon)?,
            max_lat: parse_bound(max_lat)?,
        })
    }
}

fn parse_bound(value: &str) -> Result<f64, BrokerError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|bound| bound.is_finite())
        .ok_or_else(|| BrokerError::InvalidSpatialBounds(value.to_string()))
}

/// A dataset tracked by the broker: ERDDAP server base URL plus dataset ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DatasetKey {
    pub server: String,
    pub dataset_id: String,
}

impl DatasetKey {
    pub fn new(server: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self {
            server: server.into().trim_end_matches('/').to_string(),
            dataset_id: dataset_id.into(),
        }
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.dataset_id, self.server)
    }
}
