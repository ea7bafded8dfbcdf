use anyhow::Context;
use clap::{Parser, Subcommand};
use raw_ingest::config::IngestSettings;
use raw_ingest::error::BudgetExceeded;
use raw_ingest::resolver::SecretCache;
use raw_ingest::{
    bootstrap, logging, observability, IngestError, IngestionOutcome, IngestionRequest, StorageKey,
};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "raw_ingest")]
#[command(about = "Fetch a source payload and persist it raw to an object store")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to a TOML settings file (defaults to RAW_INGEST_CONFIG or raw_ingest.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one ingestion invocation and print its outcome as JSON
    Invoke {
        /// JSON request file, or `-` for stdin
        #[arg(long, conflicts_with_all = ["secret_ref", "bucket", "invocation_id", "params"])]
        request: Option<PathBuf>,
        /// Secret reference holding the source configuration
        #[arg(long)]
        secret_ref: Option<String>,
        /// Target container for the raw payload
        #[arg(long)]
        bucket: Option<String>,
        /// Caller-supplied invocation id
        #[arg(long)]
        invocation_id: Option<String>,
        /// Query parameter forwarded to the source (repeatable)
        #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// Print Prometheus metrics to stderr after the run
        #[arg(long)]
        print_metrics: bool,
    },
    /// Print the storage key for a source id and invocation id
    Key {
        #[arg(long)]
        source_id: String,
        #[arg(long)]
        invocation_id: String,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))
}

fn read_request(path: &PathBuf) -> anyhow::Result<IngestionRequest> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?
    };
    serde_json::from_str(&raw).context("request is not a valid invocation input")
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load environment variables
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Key { source_id, invocation_id } => {
            let key = StorageKey::derive(&source_id, &invocation_id)?;
            println!("{}", key);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Invoke {
            request,
            secret_ref,
            bucket,
            invocation_id,
            params,
            print_metrics,
        } => {
            let settings = IngestSettings::load(cli.config.as_deref())?;
            let _guard = logging::init_logging(&settings.logging);
            if print_metrics {
                observability::init().map_err(|e| anyhow::anyhow!(e))?;
            }

            let request = match request {
                Some(path) => read_request(&path)?,
                None => IngestionRequest {
                    secret_reference: secret_ref.context("--secret-ref is required")?,
                    raw_bucket: bucket.context("--bucket is required")?,
                    query_parameters: params.into_iter().collect::<BTreeMap<_, _>>(),
                    invocation_id: invocation_id.context("--invocation-id is required")?,
                },
            };

            let cache = Arc::new(SecretCache::new(settings.cache_ttl()));
            let use_case = bootstrap::build_use_case(&settings, cache)?;

            let result = use_case.run_within(&request, settings.invocation_budget()).await;
            let (outcome, code) = report(result);
            if let Some(outcome) = outcome {
                println!("{}", serde_json::to_string(&outcome)?);
            }

            if print_metrics {
                if let Some(text) = observability::render() {
                    eprintln!("{}", text);
                }
            }
            Ok(ExitCode::from(code))
        }
    }
}

/// Outcome to print and process exit code: 0 for success or partial, 1 for a
/// classified failure, 2 for budget expiry, which prints nothing.
fn report(result: Result<Result<IngestionOutcome, IngestError>, BudgetExceeded>) -> (Option<IngestionOutcome>, u8) {
    match result {
        Ok(Ok(outcome)) => (Some(outcome), 0),
        Ok(Err(e)) => (Some(IngestionOutcome::failure(&e)), 1),
        Err(_) => (None, 2),
    }
}
