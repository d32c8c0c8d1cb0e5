use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::BrokerError;

pub const DEFAULT_VOCABULARY_ENDPOINT: &str = "https://vocab.nerc.ac.uk/sparql/";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;
pub const CONFIG_FILE_NAME: &str = "eov-broker.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    /// Server URL to dataset IDs; `null` asks the broker to list the whole server.
    #[serde(default)]
    pub servers: Option<ServerMap>,
    #[serde(default)]
    pub vocabulary_endpoint: Option<String>,
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
    #[serde(default)]
    pub pools: Option<PoolConfig>,
}

/// The `servers` object, in the order the entries appear in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerMap(pub Vec<(String, Option<Vec<String>>)>);

impl<'de> Deserialize<'de> for ServerMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ServerMapVisitor;

        impl<'de> Visitor<'de> for ServerMapVisitor {
            type Value = ServerMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of server URLs to dataset ID lists or null")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ServerMap, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, Option<Vec<String>>>()? {
                    entries.push(entry);
                }
                Ok(ServerMap(entries))
            }
        }

        deserializer.deserialize_map(ServerMapVisitor)
    }
}

impl Serialize for ServerMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (url, datasets) in &self.0 {
            map.serialize_entry(url, datasets)?;
        }
        map.end()
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub vocabulary: Option<usize>,
    #[serde(default)]
    pub datasets: Option<usize>,
    #[serde(default)]
    pub matching: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetSelection {
    Explicit(Vec<String>),
    Discover,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    pub url: String,
    pub datasets: DatasetSelection,
}

/// Worker counts of the three fan-out stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSizes {
    pub vocabulary: usize,
    pub datasets: usize,
    pub matching: usize,
}

impl Default for PoolSizes {
    fn default() -> Self {
        Self {
            vocabulary: 10,
            datasets: 5,
            matching: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub servers: Vec<ServerEntry>,
    pub vocabulary_endpoint: String,
    pub http_timeout: Duration,
    pub pools: PoolSizes,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            servers: default_servers(),
            vocabulary_endpoint: DEFAULT_VOCABULARY_ENDPOINT.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            pools: PoolSizes::default(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `eov-broker.json` from the current directory.
    /// Without an explicit path and without the file, the built-in defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, BrokerError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE_NAME),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }
        if !config_path.exists() {
            return Err(BrokerError::ConfigRead(config_path));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| BrokerError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| BrokerError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        let defaults = PoolSizes::default();
        let pools = config.pools.unwrap_or_default();

        let servers = match config.servers {
            Some(ServerMap(servers)) => servers
                .into_iter()
                .map(|(url, datasets)| ServerEntry {
                    url: url.trim_end_matches('/').to_string(),
                    datasets: match datasets {
                        Some(ids) => DatasetSelection::Explicit(ids),
                        None => DatasetSelection::Discover,
                    },
                })
                .collect(),
            None => default_servers(),
        };

        ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            servers,
            vocabulary_endpoint: config
                .vocabulary_endpoint
                .unwrap_or_else(|| DEFAULT_VOCABULARY_ENDPOINT.to_string()),
            http_timeout: Duration::from_secs(
                config
                    .http_timeout_secs
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS)
                    .max(1),
            ),
            pools: PoolSizes {
                vocabulary: pools.vocabulary.unwrap_or(defaults.vocabulary).max(1),
                datasets: pools.datasets.unwrap_or(defaults.datasets).max(1),
                matching: pools.matching.unwrap_or(defaults.matching).max(1),
            },
        }
    }
}

pub fn default_servers() -> Vec<ServerEntry> {
    let ifremer = [
        "ArgoFloats",
        "ArgoFloats-synthetic-BGC",
        "SDC_BAL_CLIM_TS_V2_m",
        "SDC_BAL_CLIM_TS_V2_s",
        "SDC_GLO_AGG_V2",
        "SDC_GLO_CLIM_TS_V2_1",
        "SDC_GLO_CLIM_TS_V2_2",
        "SDC_BLS_CLIM_TS_V2_m",
        "SDC_BLS_CLIM_TS_V2_s",
        "SDC_MED_CLIM_TS_V2_m_pre_post_emt",
        "SDC_MED_CLIM_TS_V2_m_whole_period",
        "SDC_MED_CLIM_TS_V2_s_decades",
        "SDC_MED_CLIM_TS_V2_s_pre_post_emt",
        "SDC_MED_CLIM_TS_V2_s_whole_period",
        "SDC_NAT_CLIM_TS_V2_050_m",
        "SDC_NAT_CLIM_TS_V2_050_s",
    ];
    vec![
        ServerEntry {
            url: "https://www.ifremer.fr/erddap".to_string(),
            datasets: DatasetSelection::Explicit(ifremer.iter().map(|id| id.to_string()).collect()),
        },
        ServerEntry {
            url: "http://erddap.emso.eu/erddap".to_string(),
            datasets: DatasetSelection::Discover,
        },
        ServerEntry {
            url: "https://erddap.icos-cp.eu/erddap".to_string(),
            datasets: DatasetSelection::Explicit(vec!["icos11ss20211206".to_string()]),
        },
    ]
}
