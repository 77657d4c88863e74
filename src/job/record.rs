//! Job record types and status definitions.

use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Opaque unique identifier for a download job, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(u64);

impl JobId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric value, for logging and display purposes.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be picked up by the scheduler.
    Queued,
    /// An executor owns the job and is transferring bytes.
    Downloading,
    /// Cooperatively stopped; resumable back to Queued.
    Paused,
    /// Cooperatively stopped for good.
    Cancelled,
    /// Transfer finished (or skipped by duplicate policy).
    Completed,
    /// Transfer failed; retryable back to Queued.
    Failed,
}

impl JobStatus {
    /// Returns the canonical string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Returns true for statuses no executor will ever pick up again.
    ///
    /// Paused is not terminal: Resume moves it back to Queued.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "downloading" => Ok(Self::Downloading),
            "paused" => Ok(Self::Paused),
            "cancelled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid job status: {s}")),
        }
    }
}

/// How a grouped ("aggregate") download was assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    /// An ordered content collection (pages keep their position).
    Pool,
    /// An unordered set of related items.
    Set,
}

impl GroupType {
    /// Returns the canonical string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pool => "pool",
            Self::Set => "set",
        }
    }
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifying fields for a remote media item, sufficient to re-resolve its
/// content later (resolved links may be short-lived).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaRef {
    /// Source key matching a registered resolver (e.g. "direct").
    pub source: String,
    /// Item identifier within the source.
    pub item_id: String,
    /// Human-readable title, used for destination naming.
    pub title: String,
    /// Artist/creator, used for destination naming.
    pub artist: String,
    /// File extension (without dot) when the source reports one upfront.
    ///
    /// When `None`, the executor recomputes the extension from the resolved
    /// content URL and rewrites only the extension portion of the
    /// destination path.
    pub extension: Option<String>,
}

/// A single unit of download work tracked by the engine.
///
/// Non-aggregate jobs are mutated only by the executor that owns them (plus
/// the explicit pause/resume/cancel/retry operations). Aggregate jobs are
/// mutated only by the rollup coordinator, which derives their byte counters
/// and status from `children_ids`.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    /// Unique identifier.
    pub id: JobId,
    /// Identifying fields for re-resolution and naming.
    pub media: MediaRef,
    /// Resolved target file path. Rewritten at most once (extension only)
    /// when the extension was unknown at creation.
    pub destination_path: PathBuf,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Bytes written so far for the current attempt.
    pub bytes_downloaded: u64,
    /// Expected size from the content-length hint; 0 means unknown/streamed.
    pub total_bytes: u64,
    /// When the job was created.
    pub queued_at: SystemTime,
    /// When an executor first claimed the job.
    pub started_at: Option<SystemTime>,
    /// When the job reached Completed.
    pub completed_at: Option<SystemTime>,
    /// Captured failure message, cleared on retry.
    pub error_message: Option<String>,
    /// Number of explicit retries performed.
    pub retry_count: u32,
    /// Marks a synthetic parent job.
    pub is_aggregate: bool,
    /// Group kind for aggregates.
    pub group_type: Option<GroupType>,
    /// Weak back-reference to the owning aggregate; lookup key only.
    pub parent_id: Option<JobId>,
    /// Ordered member ids, owned exclusively by the aggregate.
    pub children_ids: Vec<JobId>,
}

impl DownloadJob {
    /// Creates a queued job for one media item.
    pub(crate) fn new(id: JobId, media: MediaRef, destination_path: PathBuf) -> Self {
        Self {
            id,
            media,
            destination_path,
            status: JobStatus::Queued,
            bytes_downloaded: 0,
            total_bytes: 0,
            queued_at: SystemTime::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            retry_count: 0,
            is_aggregate: false,
            group_type: None,
            parent_id: None,
            children_ids: Vec::new(),
        }
    }

    /// Creates a job that is Completed from the start (duplicate-skip).
    ///
    /// No network work is ever performed for such a job; byte counters stay
    /// at zero.
    pub(crate) fn new_completed(id: JobId, media: MediaRef, destination_path: PathBuf) -> Self {
        let mut job = Self::new(id, media, destination_path);
        job.status = JobStatus::Completed;
        job.completed_at = Some(SystemTime::now());
        job
    }

    /// Creates a synthetic parent job for a named group.
    ///
    /// The descriptive label is carried in `media.title`; the destination
    /// path is the group directory.
    pub(crate) fn new_aggregate(
        id: JobId,
        group_type: GroupType,
        label: &str,
        destination_path: PathBuf,
    ) -> Self {
        let media = MediaRef {
            title: label.to_string(),
            ..MediaRef::default()
        };
        let mut job = Self::new(id, media, destination_path);
        job.is_aggregate = true;
        job.group_type = Some(group_type);
        job
    }

    /// Fraction of the transfer completed, when the total is known.
    #[must_use]
    pub fn progress(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        Some(self.bytes_downloaded as f64 / self.total_bytes as f64)
    }
}

impl fmt::Display for DownloadJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DownloadJob {{ id: {}, source: {}, item: {}, status: {} }}",
            self.id, self.media.source, self.media.item_id, self.status
        )
    }
}
