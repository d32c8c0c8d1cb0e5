use serde::{Deserialize, Serialize};

use crate::error::BrokerError;

/// One row of an ERDDAP `info/<dataset>/index.csv` metadata table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MetadataRow {
    #[serde(rename = "Row Type")]
    pub row_type: String,
    #[serde(rename = "Variable Name")]
    pub variable_name: String,
    #[serde(rename = "Attribute Name", default)]
    pub attribute_name: String,
    #[serde(rename = "Data Type", default)]
    pub data_type: String,
    #[serde(rename = "Value", default)]
    pub value: String,
}

impl MetadataRow {
    pub fn attribute(variable_name: &str, attribute_name: &str, value: &str) -> Self {
        Self {
            row_type: "attribute".to_string(),
            variable_name: variable_name.to_string(),
            attribute_name: attribute_name.to_string(),
            data_type: "String".to_string(),
            value: value.to_string(),
        }
    }
}

pub fn parse_metadata_csv(content: &[u8]) -> Result<Vec<MetadataRow>, BrokerError> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content)
        .deserialize::<MetadataRow>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| BrokerError::TableParse(err.to_string()))
}

/// Dataset IDs from an ERDDAP `info/index.csv` listing, in server order.
pub fn parse_catalog_csv(content: &[u8]) -> Result<Vec<String>, BrokerError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content);
    let index = reader
        .headers()
        .map_err(|err| BrokerError::TableParse(err.to_string()))?
        .iter()
        .position(|header| header == "Dataset ID")
        .ok_or_else(|| BrokerError::TableParse("missing column \"Dataset ID\"".to_string()))?;

    let mut ids = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| BrokerError::TableParse(err.to_string()))?;
        if let Some(id) = record.get(index).map(str::trim).filter(|id| !id.is_empty()) {
            ids.push(id.to_string());
        }
    }
    Ok(ids)
}

/// Tabular result of an ERDDAP `.csv` data request: column names, their units and the data rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataTable {
    pub columns: Vec<String>,
    pub units: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    /// ERDDAP writes the column names on the first line and units on the second.
    pub fn from_erddap_csv(content: &[u8]) -> Result<Self, BrokerError> {
        let mut records = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(content)
            .into_records();

        let columns = match records.next() {
            Some(record) => record
                .map_err(|err| BrokerError::TableParse(err.to_string()))?
                .iter()
                .map(str::to_string)
                .collect::<Vec<_>>(),
            None => return Ok(Self::default()),
        };
        let units = match records.next() {
            Some(record) => record
                .map_err(|err| BrokerError::TableParse(err.to_string()))?
                .iter()
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        };
        let rows = records
            .map(|record| {
                record
                    .map(|record| record.iter().map(str::to_string).collect::<Vec<_>>())
                    .map_err(|err| BrokerError::TableParse(err.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            columns,
            units,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let index = self.columns.iter().position(|column| column == name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(index).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }

    /// Keeps only the named columns that exist, in the order given.
    pub fn select(&self, names: &[&str]) -> DataTable {
        let indices = names
            .iter()
            .filter_map(|name| self.columns.iter().position(|column| column == name))
            .collect::<Vec<_>>();
        let pick = |values: &[String]| {
            indices
                .iter()
                .map(|&index| values.get(index).cloned().unwrap_or_default())
                .collect::<Vec<_>>()
        };
        DataTable {
            columns: pick(self.columns.as_slice()),
            units: pick(self.units.as_slice()),
            rows: self.rows.iter().map(|row| pick(row.as_slice())).collect(),
        }
    }
}
