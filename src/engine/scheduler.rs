//! Fixed-tick scheduling loop dispatching queued jobs.
//!
//! Each tick snapshots the queued jobs oldest-first, spawns one executor
//! task per job, and waits for the whole batch before scanning again.
//! Dispatch order is the only ordering guarantee; completion order and
//! jobs enqueued mid-scan are not ordered. Individual job failures never
//! stop the loop; a loop-level error logs and backs off.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::task::JoinError;
use tracing::{debug, info, warn};

use super::EngineInner;
use super::executor::execute_job;

/// Interval between queue scans.
pub(crate) const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Longer delay after a loop-level error.
pub(crate) const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Runs the scheduling loop until shutdown is observed.
///
/// Shutdown stops new ticks only; executors already dispatched in the
/// current tick are awaited and reach a terminal state naturally.
pub(crate) async fn run(inner: Arc<EngineInner>) {
    info!("scheduler started");
    while !inner.shutdown.load(Ordering::SeqCst) {
        if let Err(error) = run_tick(&inner).await {
            warn!(error = %error, "scheduler tick failed, backing off");
            tokio::time::sleep(ERROR_BACKOFF).await;
            continue;
        }
        tokio::time::sleep(TICK_INTERVAL).await;
    }
    info!("scheduler stopped");
}

/// Dispatches all currently-queued jobs and awaits the batch.
async fn run_tick(inner: &Arc<EngineInner>) -> Result<(), JoinError> {
    let due = inner.registry.queued_oldest_first();
    if due.is_empty() {
        return Ok(());
    }
    debug!(count = due.len(), "dispatching queued jobs");

    // Launch everything concurrently; the admission gate inside the
    // executor bounds how many actually transfer at once.
    let mut handles = Vec::with_capacity(due.len());
    for job in due {
        let inner = Arc::clone(inner);
        handles.push(tokio::spawn(execute_job(inner, job.id)));
    }

    for handle in handles {
        handle.await?;
    }
    Ok(())
}
