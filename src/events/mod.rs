//! Fire-and-forget notification channels for engine consumers.
//!
//! Two independent broadcast streams decouple the engine from any consumer:
//! status-changed and progress-updated. Delivery is asynchronous,
//! in-process, and best-effort; a slow subscriber can lag and miss events
//! without affecting the engine. There is no cross-restart guarantee.

use tokio::sync::broadcast;

use crate::job::{JobId, JobStatus};

/// Buffered events per channel before a slow subscriber starts lagging.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A job's status changed (or an aggregate was recomputed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEvent {
    /// The job concerned.
    pub job_id: JobId,
    /// Its status at emission time.
    pub status: JobStatus,
}

/// A job's byte counters moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    /// The job concerned.
    pub job_id: JobId,
    /// Bytes written so far.
    pub bytes_downloaded: u64,
    /// Expected total; 0 when unknown.
    pub total_bytes: u64,
}

/// Owner of the two notification channels.
#[derive(Debug)]
pub struct NotificationHub {
    status_tx: broadcast::Sender<StatusEvent>,
    progress_tx: broadcast::Sender<ProgressEvent>,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationHub {
    /// Creates the hub with both channels open.
    #[must_use]
    pub fn new() -> Self {
        let (status_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (progress_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            status_tx,
            progress_tx,
        }
    }

    /// Subscribes to status-changed events.
    #[must_use]
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.status_tx.subscribe()
    }

    /// Subscribes to progress-updated events.
    #[must_use]
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress_tx.subscribe()
    }

    /// Emits a status notification. A send with no subscribers is not an
    /// error.
    pub(crate) fn notify_status(&self, job_id: JobId, status: JobStatus) {
        let _ = self.status_tx.send(StatusEvent { job_id, status });
    }

    /// Emits a progress notification.
    pub(crate) fn notify_progress(&self, job_id: JobId, bytes_downloaded: u64, total_bytes: u64) {
        let _ = self.progress_tx.send(ProgressEvent {
            job_id,
            bytes_downloaded,
            total_bytes,
        });
    }
}
