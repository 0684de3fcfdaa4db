use crate::sync_engine::{SyncEngine, SyncError};
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};

/// Runs a sync cycle, waits for it to finish, then sleeps `interval`, forever.
/// Cycle failures are logged; the next run is the retry.
pub async fn run_periodic_sync(engine: Arc<SyncEngine>, interval: Duration) {
    loop {
        info!("Running proposal sync");

        match engine.run_cycle().await {
            Ok(report) => info!(
                fetched = report.fetched,
                created = report.created,
                updated = report.updated,
                recreated = report.recreated,
                failed = report.failed,
                "Proposal sync completed"
            ),
            Err(SyncError::CycleInProgress) => {
                warn!("Another sync holds the engine, skipping this run")
            }
            Err(e) => error!(error = %e, error_chain = ?e, "Proposal sync failed"),
        }

        info!(
            "Proposal sync finished, sleeping for {} seconds",
            interval.as_secs()
        );
        tokio::time::sleep(interval).await;
    }
}
