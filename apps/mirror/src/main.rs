//! Mirrors every survey collection once and exits.
//!
//! Exit status is 0 when every collection was synced or skipped, 1 otherwise.

use std::process::ExitCode;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bienestar_context::{MirrorConfig, ServiceContext};
use bienestar_core::sync::{CollectionOutcome, MirrorReport, MirrorTrigger};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn log_report(report: &MirrorReport) {
    for entry in &report.collections {
        match &entry.outcome {
            CollectionOutcome::Synced { count } => info!(
                "{}: {} documents mirrored ({} attempt(s), {}ms)",
                entry.collection, count, entry.attempts, entry.duration_ms
            ),
            CollectionOutcome::Skipped => {
                info!("{}: no documents to mirror", entry.collection)
            }
            CollectionOutcome::Failed { cause, retry_class } => error!(
                "{}: failed ({:?}) after {} attempt(s): {}",
                entry.collection, retry_class, entry.attempts, cause
            ),
            CollectionOutcome::Cancelled => warn!("{}: cancelled", entry.collection),
        }
    }
    info!(
        "Mirror finished in {}ms: {} documents, failed collections: {:?}",
        report.duration_ms,
        report.synced_documents(),
        report.failed_collections()
    );
}

async fn run() -> anyhow::Result<MirrorReport> {
    let config = MirrorConfig::from_env().context("Invalid mirror configuration")?;
    config.require_destination_uri()?;
    let context = ServiceContext::initialize(&config)
        .await
        .context("Could not open the document stores")?;
    info!(
        "Mirroring database '{}' (mode={})",
        context.database, config.mode
    );
    Ok(context.run_mirror(MirrorTrigger::Manual).await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run().await {
        Ok(report) => {
            log_report(&report);
            if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            error!("Mirror aborted: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
