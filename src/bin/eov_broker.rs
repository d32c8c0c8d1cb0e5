use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use marine_eov_broker::broker::{Broker, BrokerQuery};
use marine_eov_broker::config::{ConfigLoader, ResolvedConfig};
use marine_eov_broker::erddap::ErddapHttpClient;
use marine_eov_broker::error::BrokerError;
use marine_eov_broker::nvs::NvsHttpClient;
use marine_eov_broker::output::{DatasetListing, DownloadResult, JsonOutput};

#[derive(Parser)]
#[command(name = "eov-broker")]
#[command(
    about = "Find ERDDAP datasets serving Essential Ocean Variables and build their data requests"
)]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Match datasets against an EOV query and print the requests")]
    Query(QueryArgs),
    #[command(about = "List the datasets tracked by the broker")]
    Datasets,
    #[command(about = "Submit a query, then download one matched dataset")]
    Download(DownloadArgs),
}

#[derive(Args, Clone)]
struct QueryArgs {
    #[arg(long = "eov", required = true, num_args = 1..)]
    eovs: Vec<String>,

    #[arg(long)]
    start: String,

    #[arg(long)]
    end: String,

    #[arg(long, allow_hyphen_values = true)]
    min_lon: String,

    #[arg(long, allow_hyphen_values = true)]
    min_lat: String,

    #[arg(long, allow_hyphen_values = true)]
    max_lon: String,

    #[arg(long, allow_hyphen_values = true)]
    max_lat: String,

    #[arg(long, default_value = "csv")]
    format: String,
}

impl QueryArgs {
    fn to_query(&self) -> BrokerQuery {
        BrokerQuery {
            eovs: self.eovs.clone(),
            start: self.start.clone(),
            end: self.end.clone(),
            min_lon: self.min_lon.clone(),
            min_lat: self.min_lat.clone(),
            max_lon: self.max_lon.clone(),
            max_lat: self.max_lat.clone(),
            output_format: self.format.clone(),
        }
    }
}

#[derive(Args)]
struct DownloadArgs {
    #[arg(long)]
    dataset: String,

    #[arg(long)]
    output: Option<Utf8PathBuf>,

    #[command(flatten)]
    query: QueryArgs,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<BrokerError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &BrokerError) -> u8 {
    if error.is_input_error() {
        return 2;
    }
    match error {
        BrokerError::UnknownDatasetId(_)
        | BrokerError::EovNotFound { .. }
        | BrokerError::ConfigRead(_)
        | BrokerError::ConfigParse(_) => 2,
        BrokerError::VocabularyHttp(_)
        | BrokerError::VocabularyStatus { .. }
        | BrokerError::ErddapHttp(_)
        | BrokerError::ErddapStatus { .. }
        | BrokerError::MetadataFetch { .. }
        | BrokerError::CapabilityFetch { .. }
        | BrokerError::CatalogListing { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Query(args) => {
            let query = args.to_query().validate()?;
            let broker = connect(&config)?;
            let response = broker.submit_validated(&query);
            JsonOutput::print_response(&response).into_diagnostic()?;
        }
        Commands::Datasets => {
            let broker = connect(&config)?;
            let listing = DatasetListing {
                datasets: broker
                    .datasets()
                    .iter()
                    .map(|dataset| dataset.summary())
                    .collect(),
            };
            JsonOutput::print_datasets(&listing).into_diagnostic()?;
        }
        Commands::Download(args) => {
            let query = args.query.to_query();
            let validated = query.validate()?;
            let broker = connect(&config)?;
            let response = broker.submit_validated(&validated);
            let path = response.download(
                &args.dataset,
                validated.output_format,
                args.output.as_deref(),
            )?;
            info!(dataset = %args.dataset, path = %path, "downloaded");
            JsonOutput::print_download(&DownloadResult {
                dataset_id: args.dataset,
                format: validated.output_format.to_string(),
                path: path.to_string(),
            })
            .into_diagnostic()?;
        }
    }
    Ok(())
}

fn connect(config: &ResolvedConfig) -> Result<Broker<ErddapHttpClient>, BrokerError> {
    let erddap = ErddapHttpClient::new(config.http_timeout)?;
    let vocabulary = NvsHttpClient::new(&config.vocabulary_endpoint, config.http_timeout)?;
    Broker::new(erddap, &vocabulary, config)
}
