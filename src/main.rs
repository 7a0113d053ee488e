use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tracepulse::config::AppConfig;
use tracepulse::duration::{format_duration, parse_duration};
use tracepulse::report::export_report;
use tracepulse_adapters::{LogFileSource, RecordSource};
use tracepulse_engine::{EngineConfig, Output, Scheduler};

#[derive(Parser, Debug)]
#[command(name = "tracepulse")]
#[command(about = "Polling analytics over OpenTelemetry traces, logs and metrics")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Analyze an unstructured log file instead of querying ClickHouse
    #[arg(short, long)]
    log_file: Option<PathBuf>,

    /// Poll interval (e.g., "10", "10s", "500ms"); overrides the config file
    #[arg(short, long)]
    interval: Option<String>,

    /// Append results as JSON lines to this file instead of stdout
    #[arg(short, long, conflicts_with = "export")]
    output: Option<PathBuf>,

    /// Publish the distribution and per-endpoint analyses too
    #[arg(long)]
    extended: bool,

    /// Write a single report of the backfill window to this file and exit
    #[arg(short, long)]
    export: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout carries only results
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::load(args.config.as_deref())?;

    let mut engine = config.engine_config()?;
    if let Some(ref interval) = args.interval {
        engine.poll_interval = parse_duration(interval)?;
    }
    engine.extended_analyses |= args.extended;
    engine.validate()?;

    let source = build_source(&args, &config)?;

    // Handle export mode (one-shot)
    if let Some(ref export_path) = args.export {
        return export_report(source.as_ref(), &engine, export_path).await;
    }

    let output = args.output.clone().or_else(|| config.output.path.clone());
    run_stream(source, engine, output, config.output.log_results).await
}

/// Pick the record source: a log file if given, ClickHouse otherwise.
fn build_source(args: &Args, config: &AppConfig) -> Result<Arc<dyn RecordSource>> {
    match args.log_file {
        Some(ref path) => Ok(Arc::new(LogFileSource::new(path))),
        None => store_source(config),
    }
}

#[cfg(feature = "clickhouse")]
fn store_source(config: &AppConfig) -> Result<Arc<dyn RecordSource>> {
    Ok(Arc::new(config.clickhouse_source()?))
}

#[cfg(not(feature = "clickhouse"))]
fn store_source(_config: &AppConfig) -> Result<Arc<dyn RecordSource>> {
    anyhow::bail!("No --log-file given and ClickHouse support is not compiled in")
}

/// Poll until interrupted, writing every result to the chosen output.
async fn run_stream(
    source: Arc<dyn RecordSource>,
    engine: EngineConfig,
    output: Option<PathBuf>,
    log_results: bool,
) -> Result<()> {
    info!(
        source = source.description(),
        interval = %format_duration(engine.poll_interval),
        extended = engine.extended_analyses,
        "starting"
    );

    let scheduler = Scheduler::builder().source(source).config(engine).build()?;

    let registry = scheduler.registry();
    match output {
        Some(path) => registry.register(Arc::new(Output::file(path))),
        None => registry.register(Arc::new(Output::stdout())),
    };
    if log_results {
        registry.register(Arc::new(Output::log()));
    }

    let handle = scheduler.start();

    tokio::signal::ctrl_c().await?;
    info!("interrupted, shutting down");
    handle.stop();
    handle.join().await;

    Ok(())
}
