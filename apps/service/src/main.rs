use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use logger::{LogOptions, init_tracing};
use tokio::sync::mpsc;
use tracing::{info, warn};
use upwatch::{
    AlertDispatcher, AlertEvent, ChannelDispatcher, InMemoryMetricsStore, InMemoryRegistry,
    LogDispatcher, MonitoringScheduler, PerformanceProbe, Probe, Target,
};

mod config;
mod report;

use config::Config;
use report::SlaReporter;

const ALERT_CHANNEL_CAPACITY: usize = 64;

#[derive(Parser)]
#[command(name = "upwatch")]
#[command(about = "Adaptive HTTP(S) uptime monitoring")]
#[command(version)]
struct Cli {
    /// Configuration file, defaults to $XDG_CONFIG_HOME/upwatch/config.toml
    #[arg(long, short, env = "UPWATCH_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor every configured target until interrupted
    Run,
    /// Probe a single URL once and print the result as JSON
    Check {
        url: String,
        /// Substring the response body must contain
        #[arg(long)]
        keyword: Option<String>,
    },
    /// Print the resolved configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_config(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&LogOptions::from_settings(&config.logging.level, &config.logging.format));

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Check { url, keyword } => check(&config, url, keyword).await,
        Commands::ShowConfig => {
            println!("{config}");
            Ok(())
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let probe = PerformanceProbe::new(config.probe.to_probe_config()).context("Failed to build probe")?;

    let registry = Arc::new(InMemoryRegistry::new());
    for target in config.targets().context("Invalid target configuration")? {
        registry.insert(target).await?;
    }
    // Nothing reads further back than the report window
    let window = config.report.window()?;
    let store = Arc::new(InMemoryMetricsStore::with_retention(window.duration()));
    info!(retention_hours = store.retention().num_hours(), "Metrics retention configured");

    let (alert_tx, alert_rx) = mpsc::channel(ALERT_CHANNEL_CAPACITY);
    let alert_handle = spawn_alert_consumer(alert_rx);

    let scheduler = MonitoringScheduler::new(
        registry.clone(),
        Arc::new(probe),
        store.clone(),
        Arc::new(ChannelDispatcher::new(alert_tx)),
    );
    let scheduled = scheduler.start_all().await.context("Failed to schedule targets")?;
    info!(targets = scheduled, "upwatch running, press Ctrl+C to stop");

    let reporter =
        SlaReporter::new(registry, store, window, config.report.period());
    let report_handle = reporter.start_periodic_report();

    tokio::signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;

    info!("Shutting down");
    scheduler.stop_all().await;
    report_handle.abort();
    alert_handle.abort();
    Ok(())
}

/// Drain alert events into the log
fn spawn_alert_consumer(mut rx: mpsc::Receiver<AlertEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let dispatcher = LogDispatcher;
        while let Some(event) = rx.recv().await {
            if let Err(e) = dispatcher.dispatch(event).await {
                warn!("Failed to deliver alert: {}", e);
            }
        }
    })
}

async fn check(config: &Config, url: String, keyword: Option<String>) -> Result<()> {
    let mut target = Target::new(url);
    if let Some(keyword) = keyword {
        target = target.with_keyword(keyword);
    }
    target.validate()?;

    let probe = PerformanceProbe::new(config.probe.to_probe_config()).context("Failed to build probe")?;
    let result = probe.check(&target).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
