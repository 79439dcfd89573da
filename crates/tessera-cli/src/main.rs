use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tessera_client::Providers;
use tessera_core::{
    Job, JobResult, TesseraConfig, TracingWorkerReporter, WorkerConfig, WorkerHandle,
    WorkerService,
};

#[derive(Parser)]
#[command(
    name = "tessera",
    version,
    about = "Scrape worker: job dispatch with credential rotation"
)]
struct Cli {
    /// Allow web jobs to reach private/reserved addresses
    #[arg(long, global = true, default_value_t = false)]
    allow_private_urls: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single job and print its result
    Exec {
        /// Job family (web, twitter, reddit, tiktok, telemetry)
        #[arg(short = 't', long = "type")]
        job_type: String,

        /// Subtype within the family (defaults to the family's first subtype)
        #[arg(short, long)]
        query_type: Option<String>,

        /// Job arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,

        /// Continuation token from a previous result
        #[arg(short, long)]
        cursor: Option<String>,

        /// Worker id the job's stats are attributed to
        #[arg(short, long, env = "TESSERA_WORKER_ID", default_value = "cli")]
        worker_id: String,

        /// Deadline in seconds (defaults to TESSERA_JOB_TIMEOUT_SECS)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Run every job in a JSON-lines file through the worker loop
    Batch {
        /// File with one job object per line
        #[arg(short, long)]
        file: PathBuf,

        /// Maximum jobs in flight (defaults to TESSERA_MAX_CONCURRENT_JOBS)
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Print the telemetry snapshot to stderr when done
        #[arg(long, default_value_t = false)]
        stats: bool,
    },

    /// Show advertised capabilities and credential pool status
    Capabilities,

    /// Print this worker's telemetry snapshot as JSON
    Telemetry,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tessera=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = TesseraConfig::from_env().context("Invalid configuration")?;
    let providers = Providers::from_config(&config, cli.allow_private_urls)
        .context("Failed to build provider clients")?;

    match cli.command {
        Commands::Exec {
            job_type,
            query_type,
            args,
            cursor,
            worker_id,
            timeout,
        } => {
            let arguments: serde_json::Value =
                serde_json::from_str(&args).context("--args is not valid JSON")?;
            let mut job = Job::new(job_type, arguments)
                .with_worker_id(worker_id)
                .with_timeout(timeout.map_or(config.job_timeout, Duration::from_secs));
            if let Some(query_type) = query_type {
                job = job.with_query_type(query_type);
            }
            if let Some(cursor) = cursor {
                job = job.with_cursor(cursor);
            }
            cmd_exec(job, providers, &config).await?;
        }
        Commands::Batch {
            file,
            concurrency,
            stats,
        } => {
            let concurrency = concurrency.unwrap_or(config.max_concurrent_jobs);
            cmd_batch(&file, concurrency, stats, providers, &config).await?;
        }
        Commands::Capabilities => cmd_capabilities(&providers),
        Commands::Telemetry => cmd_telemetry(providers, &config).await?,
    }

    Ok(())
}

async fn cmd_exec(job: Job, providers: Providers, config: &TesseraConfig) -> Result<()> {
    let (dispatcher, _consumer) = providers.into_dispatcher(config);

    tracing::info!(job_id = %job.id, job_type = %job.job_type, "Running job");
    let result = dispatcher.execute_into_result(&job).await;

    print_result(&result)?;
    if !result.is_success() {
        anyhow::bail!("job failed: {}", result.error);
    }
    Ok(())
}

async fn cmd_batch(
    file: &Path,
    concurrency: usize,
    print_stats: bool,
    providers: Providers,
    config: &TesseraConfig,
) -> Result<()> {
    let jobs = read_jobs(file, config.job_timeout)?;
    tracing::info!(jobs = jobs.len(), concurrency, "Starting batch");

    let (dispatcher, _consumer) = providers.into_dispatcher(config);
    let stats = dispatcher.stats().clone();
    let service = WorkerService::new(
        dispatcher,
        WorkerConfig::default().with_max_concurrent_jobs(concurrency),
    );

    let (handle, rx) = WorkerHandle::channel(concurrency * 2);
    let cancel = CancellationToken::new();

    let worker = tokio::spawn({
        let cancel = cancel.clone();
        async move { service.run(rx, cancel, &TracingWorkerReporter).await }
    });

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, finishing in-flight jobs");
                cancel.cancel();
            }
        }
    });

    let submissions: Vec<_> = jobs
        .into_iter()
        .map(|job| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.submit(job).await })
        })
        .collect();
    drop(handle);

    let mut failed = 0usize;
    for submission in submissions {
        match submission.await.context("Submission task panicked")? {
            Ok(result) => {
                if !result.is_success() {
                    failed += 1;
                }
                print_result(&result)?;
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(error = %e, "Job not executed");
            }
        }
    }

    worker
        .await
        .context("Worker task panicked")??;

    if print_stats {
        stats.flush().await;
        let snapshot = stats.to_json()?;
        eprintln!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    tracing::info!(failed, "Batch finished");
    Ok(())
}

fn cmd_capabilities(providers: &Providers) {
    println!("Capabilities:");
    for capability in providers.registry.capabilities() {
        println!("  {capability}");
    }

    for pool in providers.pools() {
        println!("\nPool '{}' ({} credentials):", pool.name(), pool.len());
        for state in pool.states() {
            println!("  {} [{}]", state.id, state.status);
        }
    }
}

async fn cmd_telemetry(providers: Providers, config: &TesseraConfig) -> Result<()> {
    let (dispatcher, _consumer) = providers.into_dispatcher(config);
    let result = dispatcher
        .execute_into_result(&Job::new("telemetry", serde_json::Value::Null))
        .await;
    let snapshot: serde_json::Value = result.decode()?;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Parse a JSON-lines job file. Jobs without a positive timeout get the
/// configured one.
fn read_jobs(path: &Path, default_timeout: Duration) -> Result<Vec<Job>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file: {}", path.display()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let value: serde_json::Value = serde_json::from_str(line)
                .with_context(|| format!("Invalid JSON on line {}", i + 1))?;
            let has_timeout = value
                .get("timeout")
                .and_then(serde_json::Value::as_u64)
                .is_some_and(|secs| secs > 0);
            let mut job: Job = serde_json::from_value(value)
                .with_context(|| format!("Invalid job on line {}", i + 1))?;
            if !has_timeout {
                job.timeout = default_timeout;
            }
            Ok(job)
        })
        .collect()
}

fn print_result(result: &JobResult) -> Result<()> {
    println!("{}", serde_json::to_string(result)?);
    Ok(())
}
