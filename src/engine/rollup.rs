//! Aggregate rollup: derives a parent job's counters and status from its
//! children.
//!
//! A single listener task is wired at engine construction and subscribes to
//! both notification channels exactly once. Every event triggers a parent
//! lookup; per-aggregate subscriptions are deliberately avoided because they
//! accumulate over the process lifetime.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::EngineInner;
use crate::job::{DownloadJob, JobId, JobStatus};

/// Spawns the persistent rollup listener. Called once, at engine
/// construction.
pub(crate) fn spawn(inner: Arc<EngineInner>) -> JoinHandle<()> {
    let status_rx = inner.hub.subscribe_status();
    let progress_rx = inner.hub.subscribe_progress();
    tokio::spawn(listen(inner, status_rx, progress_rx))
}

async fn listen(
    inner: Arc<EngineInner>,
    mut status_rx: tokio::sync::broadcast::Receiver<crate::events::StatusEvent>,
    mut progress_rx: tokio::sync::broadcast::Receiver<crate::events::ProgressEvent>,
) {
    debug!("rollup listener started");
    loop {
        let job_id = tokio::select! {
            event = status_rx.recv() => match event {
                Ok(event) => event.job_id,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "rollup listener lagged on status events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            event = progress_rx.recv() => match event {
                Ok(event) => event.job_id,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "rollup listener lagged on progress events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
        };

        // Aggregates themselves have no parent, so their own notifications
        // fall through here without recursing.
        if let Some(parent_id) = inner.registry.get(job_id).and_then(|job| job.parent_id) {
            recompute(&inner, parent_id);
        }
    }
    debug!("rollup listener stopped");
}

/// Recomputes one aggregate from its current children and notifies
/// subscribers unconditionally, so derived views refresh even when the
/// computed values are unchanged.
pub(crate) fn recompute(inner: &EngineInner, parent_id: JobId) {
    let Some(parent) = inner.registry.get(parent_id) else {
        return;
    };
    if !parent.is_aggregate {
        return;
    }

    let children: Vec<DownloadJob> = parent
        .children_ids
        .iter()
        .filter_map(|id| inner.registry.get(*id))
        .collect();

    let total_bytes: u64 = children.iter().map(|child| child.total_bytes).sum();
    let bytes_downloaded: u64 = children.iter().map(|child| child.bytes_downloaded).sum();
    let status = derive_status(&children).unwrap_or(parent.status);

    inner.registry.update(parent_id, |job| {
        job.total_bytes = total_bytes;
        job.bytes_downloaded = bytes_downloaded;
        job.status = status;
        if status == JobStatus::Completed && job.completed_at.is_none() {
            job.completed_at = Some(std::time::SystemTime::now());
        }
    });

    inner.hub.notify_status(parent_id, status);
    inner
        .hub
        .notify_progress(parent_id, bytes_downloaded, total_bytes);
}

/// Status derivation over current children, by fixed priority.
///
/// Returns `None` when no rule applies (mixed terminal/non-terminal states
/// with nothing in flight); the caller keeps the aggregate's previous
/// status in that case.
fn derive_status(children: &[DownloadJob]) -> Option<JobStatus> {
    if children.is_empty() {
        return None;
    }
    if children.iter().any(|c| c.status == JobStatus::Failed) {
        return Some(JobStatus::Failed);
    }
    if children.iter().all(|c| c.status == JobStatus::Completed) {
        return Some(JobStatus::Completed);
    }
    if children.iter().any(|c| c.status == JobStatus::Downloading) {
        return Some(JobStatus::Downloading);
    }
    if children.iter().all(|c| c.status == JobStatus::Queued) {
        return Some(JobStatus::Queued);
    }
    if children.iter().any(|c| c.status == JobStatus::Cancelled) {
        return Some(JobStatus::Cancelled);
    }
    None
}
