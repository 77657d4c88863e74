//! Thread-safe in-memory store for download jobs.
//!
//! The registry is pure storage: insert, lookup, snapshot enumeration, and
//! in-place updates through short-lived closures. Lifecycle decisions live
//! in the engine; consumers observe mutations through notifications rather
//! than re-fetch.
//!
//! Closures passed to [`update`](JobRegistry::update) and friends run while
//! a shard lock is held, so they must stay synchronous and cheap. None of
//! the registry methods are async for exactly that reason.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::record::{DownloadJob, JobId, JobStatus};

/// Concurrent keyed store for [`DownloadJob`] records.
///
/// The only mutable structure shared across the scheduler, executors, and
/// the rollup coordinator. Jobs are never deleted by the engine itself;
/// eviction is an external store's responsibility.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<JobId, DownloadJob>,
    next_id: AtomicU64,
}

impl JobRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next job id. Ids start at 1 and never repeat.
    pub(crate) fn next_id(&self) -> JobId {
        JobId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Inserts a job record.
    pub(crate) fn insert(&self, job: DownloadJob) {
        self.jobs.insert(job.id, job);
    }

    /// Returns a cloned snapshot of one job.
    #[must_use]
    pub fn get(&self, id: JobId) -> Option<DownloadJob> {
        self.jobs.get(&id).map(|entry| entry.clone())
    }

    /// Returns just the status of one job.
    #[must_use]
    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.jobs.get(&id).map(|entry| entry.status)
    }

    /// Returns a snapshot of all jobs, newest-queued first.
    #[must_use]
    pub fn list(&self) -> Vec<DownloadJob> {
        let mut jobs: Vec<DownloadJob> = self.jobs.iter().map(|entry| entry.clone()).collect();
        jobs.sort_by(|a, b| (b.queued_at, b.id).cmp(&(a.queued_at, a.id)));
        jobs
    }

    /// Returns a snapshot of queued jobs in dispatch order (oldest first).
    #[must_use]
    pub(crate) fn queued_oldest_first(&self) -> Vec<DownloadJob> {
        let mut jobs: Vec<DownloadJob> = self
            .jobs
            .iter()
            .filter(|entry| entry.status == JobStatus::Queued)
            .map(|entry| entry.clone())
            .collect();
        jobs.sort_by(|a, b| (a.queued_at, a.id).cmp(&(b.queued_at, b.id)));
        jobs
    }

    /// Counts jobs currently in `status`.
    #[must_use]
    pub fn count_by_status(&self, status: JobStatus) -> usize {
        self.jobs
            .iter()
            .filter(|entry| entry.status == status)
            .count()
    }

    /// Applies an in-place mutation to one job. Returns false if the job
    /// does not exist.
    pub(crate) fn update<F>(&self, id: JobId, f: F) -> bool
    where
        F: FnOnce(&mut DownloadJob),
    {
        match self.jobs.get_mut(&id) {
            Some(mut entry) => {
                f(&mut entry);
                true
            }
            None => false,
        }
    }

    /// Applies a mutation only when the predicate holds, atomically with
    /// respect to other registry callers. Returns whether the mutation ran.
    pub(crate) fn update_where<P, F>(&self, id: JobId, predicate: P, f: F) -> bool
    where
        P: FnOnce(&DownloadJob) -> bool,
        F: FnOnce(&mut DownloadJob),
    {
        match self.jobs.get_mut(&id) {
            Some(mut entry) => {
                if !predicate(&entry) {
                    return false;
                }
                f(&mut entry);
                true
            }
            None => false,
        }
    }

    /// Atomically moves a job from `from` to `to`.
    ///
    /// Returns false if the job is missing or not currently in `from`. This
    /// is the claim primitive executors use to take ownership of a job.
    pub(crate) fn transition(&self, id: JobId, from: JobStatus, to: JobStatus) -> bool {
        self.update_where(id, |job| job.status == from, |job| job.status = to)
    }
}
