use blob_ingest::config::{CosmosConfig, IdStrategy, IngestConfig};
use blob_ingest::ingestion::{BlobEvent, IngestionReport, IngestionResult, Pipeline};
use blob_ingest::observability::{
    init_logging, ProgressFanout, ProgressLog, ProgressObserver, TracingProgress,
};
use blob_ingest::store::{CosmosStore, DocumentStore, JsonlStore, MemoryStore};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "blob-ingest")]
#[command(about = "Load CSV blobs into a document store in batches")]
#[command(version)]
struct Args {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one CSV file as if it had just been uploaded
    Ingest {
        /// CSV file to ingest
        file: PathBuf,

        /// Target document store
        #[arg(long, value_enum, default_value = "cosmos")]
        store: StoreKind,

        /// Output file for the jsonl store
        #[arg(short, long, default_value = "documents.jsonl")]
        output: PathBuf,

        /// Records per batch (or set INGEST_BATCH_SIZE)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Batches written concurrently (or set INGEST_MAX_CONCURRENCY)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Retries for throttled, timed-out or unavailable writes
        #[arg(long)]
        max_retries: Option<u32>,

        /// Derive ids from blob name and row content so re-runs conflict
        #[arg(long)]
        deterministic_ids: bool,

        /// Stop when an entire batch fails because the store is unreachable
        #[arg(long)]
        abort_on_outage: bool,

        /// Append per-batch progress events to this JSON-lines file
        #[arg(long)]
        progress_log: Option<PathBuf>,
    },
    /// Verify Cosmos DB credentials and list visible databases
    AuthCheck,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StoreKind {
    Cosmos,
    Jsonl,
    Memory,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let args = Args::parse();
    init_logging(args.log_json);

    match args.command {
        Commands::Ingest {
            file,
            store,
            output,
            batch_size,
            concurrency,
            max_retries,
            deterministic_ids,
            abort_on_outage,
            progress_log,
        } => {
            let mut config = IngestConfig::from_env()?;
            if let Some(n) = batch_size {
                config.batch_size = n;
            }
            if let Some(n) = concurrency {
                config.max_concurrency = n;
            }
            if let Some(n) = max_retries {
                config.max_retries = n;
            }
            if deterministic_ids {
                config.id_strategy = IdStrategy::Deterministic;
            }
            if abort_on_outage {
                config.abort_on_outage = true;
            }
            run_ingest(file, store, output, config, progress_log).await
        }
        Commands::AuthCheck => run_auth_check().await,
    }
}

async fn run_ingest(
    file: PathBuf,
    kind: StoreKind,
    output: PathBuf,
    config: IngestConfig,
    progress_log: Option<PathBuf>,
) -> Result<()> {
    let store = open_store(kind, &output, &config)?;
    let blob = BlobEvent::from_path(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let mut pipeline = Pipeline::new(store, config);
    if let Some(path) = progress_log {
        info!("Writing batch progress to {}", path.display());
        let observers: Vec<Arc<dyn ProgressObserver>> = vec![
            Arc::new(TracingProgress),
            Arc::new(ProgressLog::new(Some(path), 1000)),
        ];
        pipeline = pipeline.with_observer(Arc::new(ProgressFanout::new(observers)));
    }

    match pipeline.run(&blob).await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(failure) => {
            error!("Ingestion of {} failed: {}", blob.name, failure.error);
            print_result(&failure.partial);
            Err(failure.into())
        }
    }
}

async fn run_auth_check() -> Result<()> {
    let config = IngestConfig::from_env()?;
    let store = CosmosStore::new(CosmosConfig::from_env()?, config.partition_key_field)?;
    let databases = store.check_auth().await?;
    println!("Authenticated against {}: {} databases visible", store.container(), databases);
    Ok(())
}

fn open_store(
    kind: StoreKind,
    output: &Path,
    config: &IngestConfig,
) -> Result<Arc<dyn DocumentStore>> {
    let field = config.partition_key_field.clone();
    let store: Arc<dyn DocumentStore> = match kind {
        StoreKind::Cosmos => Arc::new(CosmosStore::new(CosmosConfig::from_env()?, field)?),
        StoreKind::Jsonl => Arc::new(JsonlStore::open(output, field)?),
        StoreKind::Memory => Arc::new(MemoryStore::with_partition_key_field(field)),
    };
    Ok(store)
}

fn print_report(report: &IngestionReport) {
    println!("\n=== Ingestion Summary: {} ===", report.blob_name);
    println!("Columns: {}", report.columns.join(", "));
    print_result(&report.result);
    if !report.decode_failures.is_empty() {
        println!("Rejected lines: {}", report.decode_failures.len());
        for failure in &report.decode_failures {
            println!("  - {}", failure);
        }
    }
}

fn print_result(result: &IngestionResult) {
    println!(
        "Records: {} total, {} successful, {} failed ({} batches)",
        result.total_rows, result.successful, result.failed, result.batches
    );
    for (kind, count) in &result.failures_by_kind {
        println!("  {}: {}", kind, count);
    }
    println!(
        "Elapsed: {:.2}s ({:.1} rows/second)",
        result.elapsed.as_secs_f64(),
        result.rows_per_second
    );
}
