use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use swapstat_agent::collectors::{self, SwapReport};
use swapstat_agent::config::{AgentConfig, OutputFormat};
use swapstat_agent::platform;
use swapstat_agent::vmem::VirtualMemory;

/// Swapstat Agent — virtual memory (swap) statistics collector.
#[derive(Parser, Debug)]
#[command(name = "swapstat-agent", version, about)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print a single report and exit.
    #[arg(long)]
    once: bool,

    /// Output format (overrides the configuration file).
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "swapstat_agent=info".into()),
        )
        .init();

    let cli = Cli::parse();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting swapstat agent"
    );

    let mut cfg = AgentConfig::load(cli.config.as_deref())?;
    if let Some(format) = cli.format {
        cfg.output = format;
    }
    info!(
        interval = cfg.report_interval_secs,
        refresh_after = ?cfg.refresh_after_secs,
        output = ?cfg.output,
        "Configuration loaded"
    );

    let vm = Arc::new(VirtualMemory::with_policy(
        platform::native_sources(),
        cfg.refresh_policy(),
    ));

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.report_interval_secs));

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                return Ok(());
            }
        }

        // Accessors block on OS queries.
        let vm_ref = Arc::clone(&vm);
        match tokio::task::spawn_blocking(move || collectors::collect(&vm_ref)).await {
            Ok(report) => print_report(&report, cfg.output)?,
            Err(e) => error!("Collection task failed: {e}"),
        }

        if cli.once {
            return Ok(());
        }
    }
}

fn print_report(report: &SwapReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(report)?),
        OutputFormat::Text => println!("{} {} {}", report.timestamp, report.hostname, report.swap),
    }
    Ok(())
}
