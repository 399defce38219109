mod batch;
mod config;
mod downloader;
mod helpers;
mod naming;
mod song;

use std::sync::Arc;

use batch::Manifest;
use config::Config;
use downloader::Orchestrator;
use helpers::download::HttpTransfer;
use naming::{registry::AllocationRegistry, FileNamer};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{filter::Builder as TracingFilterBuilder, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match dotenvy::dotenv() {
        Err(e) if e.not_found() => {}
        Ok(_) => {}
        Err(e) => {
            panic!("Failed to load .env file: {}", e);
        }
    }

    init_log();

    let config = Config::from_env()?;
    info!(manifest = ?config.manifest, format = %config.format, "Starting batch...");

    let manifest = Manifest::load(&config.manifest).await?;

    let registry = Arc::new(AllocationRegistry::new(config.case_folding));
    let namer = FileNamer::new(Arc::clone(&registry));
    let orchestrator = Orchestrator::new(registry, HttpTransfer::default(), config.retry_delay);

    let summary = batch::run(&manifest, &config, &namer, &orchestrator).await?;

    if summary.failed > 0 {
        warn!(?summary, "Batch finished with failures");
    } else {
        info!(?summary, "Batch finished");
    }

    Ok(())
}

fn init_log() {
    tracing_subscriber::fmt()
        .with_ansi(true)
        .with_env_filter(
            TracingFilterBuilder::default()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .finish()
        .init();
}
