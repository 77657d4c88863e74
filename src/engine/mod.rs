//! Download orchestration engine.
//!
//! Coordinates the job registry, the concurrency-bounded scheduler and
//! executors, and the aggregate rollup coordinator. The engine exposes
//! non-blocking enqueue and lifecycle operations; actual network and disk
//! work happens on the scheduler's executor tasks, bounded by a
//! semaphore-based admission gate.
//!
//! # Example
//!
//! ```no_run
//! use mediagrab_core::engine::DownloadEngine;
//! use mediagrab_core::job::MediaRef;
//! use mediagrab_core::resolver::{DirectResolver, ResolverRegistry};
//! use mediagrab_core::settings::Settings;
//! use std::path::Path;
//!
//! # async fn example() {
//! let mut resolvers = ResolverRegistry::new();
//! resolvers.register(Box::new(DirectResolver::new()));
//! let engine = DownloadEngine::new(Settings::default(), resolvers);
//!
//! let media = MediaRef {
//!     source: "direct".to_string(),
//!     item_id: "https://example.com/cat.png".to_string(),
//!     title: "cat".to_string(),
//!     ..MediaRef::default()
//! };
//! let job_id = engine.enqueue(media, Path::new("./downloads"));
//! println!("queued {job_id}");
//!
//! let runner = engine.clone();
//! tokio::spawn(async move { runner.run_scheduler().await });
//! # }
//! ```

mod error;
mod executor;
mod rollup;
mod scheduler;

pub use error::ExecuteError;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Semaphore, broadcast};
use tracing::{debug, info, instrument};

use crate::events::{NotificationHub, ProgressEvent, StatusEvent};
use crate::job::{DownloadJob, GroupType, JobId, JobRegistry, JobStatus, MediaRef};
use crate::path::{self, TemplateContext, sanitize_component};
use crate::settings::{DuplicatePolicy, Settings};
use crate::transport::HttpTransport;

pub use crate::resolver::ResolverRegistry;

/// Shared engine state, `Arc`'d into the scheduler, executors, and the
/// rollup listener.
pub(crate) struct EngineInner {
    pub(crate) registry: JobRegistry,
    pub(crate) resolvers: ResolverRegistry,
    pub(crate) transport: HttpTransport,
    pub(crate) hub: NotificationHub,
    pub(crate) settings: Settings,
    /// Counting admission gate bounding simultaneous active transfers.
    pub(crate) gate: Semaphore,
    pub(crate) shutdown: AtomicBool,
}

/// The download orchestration engine.
///
/// Cheap to clone; all clones share the same registry, gate, and
/// notification channels.
#[derive(Clone)]
pub struct DownloadEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("concurrency", &self.inner.settings.effective_concurrency())
            .field("jobs", &self.inner.registry.list().len())
            .finish()
    }
}

impl DownloadEngine {
    /// Creates the engine and wires the single persistent rollup listener.
    ///
    /// The listener subscribes to both notification channels exactly once
    /// here; `enqueue_aggregate` never adds subscriptions.
    ///
    /// Must be called within a Tokio runtime (the rollup listener is
    /// spawned immediately).
    #[must_use]
    pub fn new(settings: Settings, resolvers: ResolverRegistry) -> Self {
        let transport = HttpTransport::new(settings.network_timeout());
        let concurrency = settings.effective_concurrency();
        debug!(
            concurrency,
            timeout_secs = settings.network_timeout_secs,
            duplicate_policy = ?settings.duplicate_policy,
            "creating download engine"
        );
        let inner = Arc::new(EngineInner {
            registry: JobRegistry::new(),
            resolvers,
            transport,
            hub: NotificationHub::new(),
            settings,
            gate: Semaphore::new(concurrency),
            shutdown: AtomicBool::new(false),
        });
        rollup::spawn(Arc::clone(&inner));
        Self { inner }
    }

    // ==================== Notifications ====================

    /// Subscribes to status-changed notifications.
    #[must_use]
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.inner.hub.subscribe_status()
    }

    /// Subscribes to progress-updated notifications.
    #[must_use]
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.inner.hub.subscribe_progress()
    }

    // ==================== Enqueue Operations ====================

    /// Enqueues one media item for download under `destination_dir`.
    ///
    /// Returns immediately; never blocks on network. With duplicate policy
    /// "skip" and an existing file at the resolved path, the job is created
    /// already Completed and no network work is ever performed for it.
    #[instrument(skip(self, media), fields(source = %media.source, item_id = %media.item_id))]
    pub fn enqueue(&self, media: MediaRef, destination_dir: &Path) -> JobId {
        let template = self.inner.settings.file_template.clone();
        self.enqueue_with_context(media, destination_dir, &template, &TemplateContext::default())
    }

    /// Enqueues a batch of media items. Equivalent to calling
    /// [`enqueue`](Self::enqueue) per item.
    pub fn enqueue_many(&self, items: Vec<MediaRef>, destination_dir: &Path) -> Vec<JobId> {
        items
            .into_iter()
            .map(|media| self.enqueue(media, destination_dir))
            .collect()
    }

    /// Enqueues a named group as one aggregate job plus one child job per
    /// member.
    ///
    /// The aggregate's byte counters and status are derived from its
    /// children by the rollup coordinator; they are never set directly.
    #[instrument(skip(self, items), fields(group = %group_type, label = %label, members = items.len()))]
    pub fn enqueue_aggregate(
        &self,
        group_type: GroupType,
        items: Vec<MediaRef>,
        destination_dir: &Path,
        label: &str,
    ) -> JobId {
        let aggregate_id = self.inner.registry.next_id();
        let group_dir = destination_dir.join(sanitize_component(label));
        let aggregate =
            DownloadJob::new_aggregate(aggregate_id, group_type, label, group_dir);
        self.inner.registry.insert(aggregate);

        let template = self.inner.settings.pool_file_template.clone();
        for (index, media) in items.into_iter().enumerate() {
            let ctx = TemplateContext {
                pool_name: Some(label.to_string()),
                page_number: Some(u32::try_from(index).unwrap_or(u32::MAX).saturating_add(1)),
            };
            let child_id = self.enqueue_with_context(media, destination_dir, &template, &ctx);
            self.inner
                .registry
                .update(child_id, |job| job.parent_id = Some(aggregate_id));
            self.inner
                .registry
                .update(aggregate_id, |job| job.children_ids.push(child_id));
        }

        // Children created before their parent_id was set (including
        // duplicate-skips already Completed) emitted events the listener
        // could not attribute; one explicit seed recompute catches up.
        rollup::recompute(&self.inner, aggregate_id);

        info!(aggregate_id = %aggregate_id, "aggregate enqueued");
        aggregate_id
    }

    fn enqueue_with_context(
        &self,
        media: MediaRef,
        destination_dir: &Path,
        template: &str,
        ctx: &TemplateContext,
    ) -> JobId {
        let id = self.inner.registry.next_id();
        let destination = path::resolve_destination(&media, destination_dir, template, ctx);

        // Duplicate policy is checked exactly once, here. Two jobs racing
        // to the same destination after this point are last-writer-wins.
        let skip = self.inner.settings.duplicate_policy == DuplicatePolicy::Skip
            && destination.exists();
        let job = if skip {
            debug!(job_id = %id, path = %destination.display(), "destination exists, skipping");
            DownloadJob::new_completed(id, media, destination)
        } else {
            DownloadJob::new(id, media, destination)
        };
        let status = job.status;
        self.inner.registry.insert(job);
        self.inner.hub.notify_status(id, status);
        id
    }

    // ==================== Queries ====================

    /// Returns a snapshot of all jobs, newest-queued first.
    #[must_use]
    pub fn list_jobs(&self) -> Vec<DownloadJob> {
        self.inner.registry.list()
    }

    /// Returns a snapshot of one job.
    #[must_use]
    pub fn get_job(&self, id: JobId) -> Option<DownloadJob> {
        self.inner.registry.get(id)
    }

    // ==================== Lifecycle Transitions ====================

    /// Pauses a Downloading job. The executor observes the flag at the next
    /// chunk boundary; the partial file stays on disk.
    ///
    /// Returns false (no mutation) unless the job is Downloading.
    pub fn pause(&self, id: JobId) -> bool {
        let changed = self
            .inner
            .registry
            .transition(id, JobStatus::Downloading, JobStatus::Paused);
        if changed {
            self.inner.hub.notify_status(id, JobStatus::Paused);
        }
        changed
    }

    /// Re-queues a Paused job. The next execution restarts the transfer
    /// from byte 0 (the destination file is recreated; no range resume).
    ///
    /// Returns false (no mutation) unless the job is Paused.
    pub fn resume(&self, id: JobId) -> bool {
        let changed = self
            .inner
            .registry
            .transition(id, JobStatus::Paused, JobStatus::Queued);
        if changed {
            self.inner.hub.notify_status(id, JobStatus::Queued);
        }
        changed
    }

    /// Cancels a job. Accepted from any non-terminal state; an in-flight
    /// transfer stops at the next chunk boundary.
    ///
    /// Returns false (no mutation) if the job is already terminal.
    pub fn cancel(&self, id: JobId) -> bool {
        let changed = self.inner.registry.update_where(
            id,
            |job| !job.status.is_terminal(),
            |job| job.status = JobStatus::Cancelled,
        );
        if changed {
            self.inner.hub.notify_status(id, JobStatus::Cancelled);
        }
        changed
    }

    /// Re-queues a Failed job for a full restart: increments `retry_count`,
    /// clears the error message, and resets the byte counter. Never a
    /// byte-range resume.
    ///
    /// Returns false (no mutation) unless the job is Failed.
    pub fn retry(&self, id: JobId) -> bool {
        let changed = self.inner.registry.update_where(
            id,
            |job| job.status == JobStatus::Failed,
            |job| {
                job.status = JobStatus::Queued;
                job.retry_count += 1;
                job.error_message = None;
                job.bytes_downloaded = 0;
            },
        );
        if changed {
            self.inner.hub.notify_status(id, JobStatus::Queued);
        }
        changed
    }

    // ==================== Scheduler Lifecycle ====================

    /// Runs the scheduling loop until [`shutdown`](Self::shutdown) is
    /// called. Typically spawned as a background task.
    pub async fn run_scheduler(&self) {
        scheduler::run(Arc::clone(&self.inner)).await;
    }

    /// Signals the scheduler to stop after its current tick. In-flight
    /// executors reach a terminal state naturally; nothing is aborted.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
    }

    /// Returns true once shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    // ==================== Source Maintenance ====================

    /// Flushes metadata caches on every resolver exposing the optional
    /// cache-maintenance capability.
    pub async fn flush_source_caches(&self) {
        self.inner.resolvers.flush_caches().await;
    }
}
