//! srcontrollerd entry point.
//!
//! Loads the fabric configuration, starts a controller instance and feeds it
//! events, either from a newline-delimited JSON file or stdin (`--events`),
//! or waits for Ctrl-C when no feed is given.

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use serde::Serialize;
use sr_controller::config::{ControllerConfig, DEFAULT_CONFIG_PATH};
use sr_controller::daemon::{
    replay, ControllerStats, MemoryFabric, ReplaySummary, SrController, SrControllerConfig,
};
use sr_controller::memory::LoggingProgrammer;
use sr_controller::populator::TableSnapshot;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::BufReader;

/// Segment routing fabric controller
#[derive(Parser, Debug)]
#[command(name = "srcontrollerd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Event feed to replay, one JSON event per line ("-" for stdin)
    #[arg(short = 'e', long)]
    events: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Override the number of worker shards
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Print the forwarding tables and counters as JSON on exit
    #[arg(long)]
    dump: bool,
}

#[derive(Serialize)]
struct Dump {
    replay: Option<ReplaySummary>,
    stats: ControllerStats,
    tables: TableSnapshot,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("srcontrollerd: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = ControllerConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(workers) = args.workers {
        config.controller.workers = workers;
    }
    config.validate().context("invalid configuration")?;

    info!("srcontrollerd: local node {}", config.controller.local_node);
    info!(
        "srcontrollerd: {} devices, {} interfaces",
        config.devices.len(),
        config.interfaces.len()
    );

    let fabric = MemoryFabric::from_config(&config)?;
    let controller = SrController::new(
        SrControllerConfig {
            workers: config.controller.workers,
            host: config.host_handler_config(),
        },
        fabric.services(),
        Some(Arc::new(LoggingProgrammer)),
    );

    for device in &config.devices {
        controller.reinstall(&device.id)?;
    }
    controller.flush().await;

    let summary = match args.events.as_deref() {
        Some("-") => Some(replay(&controller, &fabric, BufReader::new(tokio::io::stdin())).await?),
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening event feed {}", path))?;
            Some(replay(&controller, &fabric, BufReader::new(file)).await?)
        }
        None => {
            info!("srcontrollerd: no event feed, waiting for Ctrl-C");
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("srcontrollerd: failed to listen for Ctrl-C: {}", e);
            }
            None
        }
    };

    if let Some(summary) = summary {
        info!(
            "srcontrollerd: replayed {} events, {} malformed lines skipped",
            summary.events, summary.malformed
        );
    }

    controller.shutdown().await;

    if args.dump {
        let dump = Dump {
            replay: summary,
            stats: controller.stats(),
            tables: controller.snapshot(),
        };
        println!("{}", serde_json::to_string_pretty(&dump)?);
    }

    info!("srcontrollerd: shutdown complete");
    Ok(())
}
