use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use crate::catalog::CatalogBuilder;
use crate::config::{PoolSizes, ResolvedConfig};
use crate::coverage::covers;
use crate::dataset::DatasetDescriptor;
use crate::domain::{Eov, OutputFormat, QueryBounds, QueryDate};
use crate::erddap::ErddapClient;
use crate::error::BrokerError;
use crate::nvs::{VocabularyClient, VocabularyEntry};
use crate::request::RequestDescriptor;
use crate::resolver::resolve_eov;
use crate::response::BrokerResponse;

/// Query arguments as received from a caller, before validation.
#[derive(Debug, Clone, Default)]
pub struct BrokerQuery {
    pub eovs: Vec<String>,
    pub start: String,
    pub end: String,
    pub min_lon: String,
    pub min_lat: String,
    pub max_lon: String,
    pub max_lat: String,
    pub output_format: String,
}

/// A query whose every argument has been checked.
#[derive(Debug, Clone)]
pub struct ValidatedQuery {
    pub eovs: Vec<Eov>,
    pub start: QueryDate,
    pub end: QueryDate,
    pub bounds: QueryBounds,
    pub output_format: OutputFormat,
}

impl BrokerQuery {
    /// Checks dates, then bounds, then output format, then EOVs; the first invalid argument fails.
    pub fn validate(&self) -> Result<ValidatedQuery, BrokerError> {
        let start = self.start.parse::<QueryDate>()?;
        let end = self.end.parse::<QueryDate>()?;
        let bounds =
            QueryBounds::parse(&self.min_lon, &self.min_lat, &self.max_lon, &self.max_lat)?;
        let output_format = self.output_format.parse::<OutputFormat>()?;

        let mut eovs = Vec::with_capacity(self.eovs.len());
        for value in &self.eovs {
            let eov = value.parse::<Eov>()?;
            if !eovs.contains(&eov) {
                eovs.push(eov);
            }
        }

        Ok(ValidatedQuery {
            eovs,
            start,
            end,
            bounds,
            output_format,
        })
    }
}

/// Federates the tracked ERDDAP datasets behind one query interface.
///
/// Vocabularies and dataset descriptors are loaded once at construction and
/// owned by the broker for its whole lifetime.
pub struct Broker<E: ErddapClient + 'static> {
    erddap: Arc<E>,
    vocabularies: BTreeMap<Eov, VocabularyEntry>,
    datasets: Vec<Arc<DatasetDescriptor>>,
    matching_pool: ThreadPool,
}

impl<E: ErddapClient + 'static> Broker<E> {
    /// Resolves every EOV against the vocabulary server, builds the catalog
    /// and loads each dataset. Datasets that fail to load are left out.
    pub fn new<V>(erddap: E, vocabulary: &V, config: &ResolvedConfig) -> Result<Self, BrokerError>
    where
        V: VocabularyClient,
    {
        let vocabulary_pool = build_pool("vocabulary", config.pools.vocabulary)?;
        let start = Instant::now();
        let vocabularies = vocabulary_pool.install(|| {
            Eov::ALL
                .par_iter()
                .map(|&eov| match vocabulary.query_eov(eov) {
                    Ok(entry) => {
                        debug!(eov = %eov, bindings = entry.bindings.len(), "resolved vocabulary");
                        (eov, entry)
                    }
                    Err(err) => {
                        warn!(
                            eov = %eov,
                            error = %err,
                            "vocabulary query failed, EOV will match nothing"
                        );
                        (eov, VocabularyEntry::default())
                    }
                })
                .collect::<BTreeMap<_, _>>()
        });
        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "gathered vocabularies"
        );

        let keys = CatalogBuilder::build(&erddap, &config.servers);

        let dataset_pool = build_pool("datasets", config.pools.datasets)?;
        let start = Instant::now();
        let mut datasets = dataset_pool.install(|| {
            keys.into_par_iter()
                .filter_map(|key| match DatasetDescriptor::load(&erddap, key.clone()) {
                    Ok(dataset) => Some(Arc::new(dataset)),
                    Err(err) => {
                        warn!(dataset = %key, error = %err, "dropping dataset");
                        None
                    }
                })
                .collect::<Vec<_>>()
        });
        datasets.sort_by(|left, right| left.key().cmp(right.key()));
        info!(
            datasets = datasets.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "broker ready"
        );

        Self::from_parts(erddap, vocabularies, datasets, config.pools)
    }

    /// Assembles a broker from vocabularies and datasets that are already loaded.
    pub fn from_parts(
        erddap: E,
        vocabularies: BTreeMap<Eov, VocabularyEntry>,
        datasets: Vec<Arc<DatasetDescriptor>>,
        pools: PoolSizes,
    ) -> Result<Self, BrokerError> {
        Ok(Self {
            erddap: Arc::new(erddap),
            vocabularies,
            datasets,
            matching_pool: build_pool("matching", pools.matching)?,
        })
    }

    pub fn erddap(&self) -> &E {
        &self.erddap
    }

    pub fn datasets(&self) -> &[Arc<DatasetDescriptor>] {
        &self.datasets
    }

    pub fn vocabulary(&self, eov: Eov) -> Option<&VocabularyEntry> {
        self.vocabularies.get(&eov)
    }

    /// Validates `query`, then matches every dataset concurrently.
    ///
    /// Invalid arguments fail before any dataset is looked at. Datasets that
    /// cannot serve the query are simply absent from the response.
    pub fn submit(&self, query: &BrokerQuery) -> Result<BrokerResponse, BrokerError> {
        let query = query.validate()?;
        Ok(self.submit_validated(&query))
    }

    pub fn submit_validated(&self, query: &ValidatedQuery) -> BrokerResponse {
        let client: Arc<dyn ErddapClient> = self.erddap.clone();
        let response = BrokerResponse::new(query.eovs.clone(), client);

        let start = Instant::now();
        self.matching_pool.install(|| {
            self.datasets.par_iter().for_each(|dataset| {
                if let Some(request) = self.setup_request(dataset, query) {
                    response.add(Arc::new(request));
                }
            });
        });
        info!(
            matched = response.len(),
            datasets = self.datasets.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "query submitted"
        );
        response
    }

    fn setup_request(
        &self,
        dataset: &Arc<DatasetDescriptor>,
        query: &ValidatedQuery,
    ) -> Option<RequestDescriptor> {
        let empty = VocabularyEntry::default();
        let mut variables = Vec::new();
        for eov in &query.eovs {
            let entry = self.vocabularies.get(eov).unwrap_or(&empty);
            variables.extend(resolve_eov(dataset, *eov, entry));
        }

        if variables.is_empty() {
            debug!(dataset = %dataset.name(), "discarding dataset, no variables found");
            return None;
        }
        debug!(dataset = %dataset.name(), variables = ?variables, "found variables");

        if !covers(
            self.erddap.as_ref(),
            dataset,
            &query.start,
            &query.end,
            &query.bounds,
        ) {
            debug!(dataset = %dataset.name(), "discarding dataset, query outside coverage");
            return None;
        }

        match RequestDescriptor::build(
            Arc::clone(dataset),
            variables,
            query.start.clone(),
            query.end.clone(),
            query.bounds,
            query.output_format,
        ) {
            Ok(request) => Some(request),
            Err(err) => {
                warn!(dataset = %dataset.name(), error = %err, "dropping dataset");
                None
            }
        }
    }
}

fn build_pool(name: &'static str, threads: usize) -> Result<ThreadPool, BrokerError> {
    ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(move |index| format!("eov-broker-{name}-{index}"))
        .build()
        .map_err(|err| BrokerError::WorkerPool(err.to_string()))
}
