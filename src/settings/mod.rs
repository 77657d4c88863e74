//! Engine configuration supplied by the embedding application.
//!
//! [`Settings`] is serde-deserializable with per-field defaults so it can be
//! loaded from any configuration format the embedding application chooses.
//! The concurrency ceiling is always read through
//! [`effective_concurrency`](Settings::effective_concurrency), which clamps
//! to the supported range.

use std::time::Duration;

use serde::Deserialize;

/// Minimum admission-gate capacity.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum admission-gate capacity.
pub const MAX_CONCURRENCY: usize = 4;

/// Default admission-gate capacity.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Default overall network timeout per transfer.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default destination template for standalone downloads.
pub const DEFAULT_FILE_TEMPLATE: &str = "{source}_{artist}_{id}_{safeTitle}.{ext}";

/// Default destination template for grouped downloads.
pub const DEFAULT_POOL_FILE_TEMPLATE: &str = "{pool_name}/{page_number}_{safeTitle}.{ext}";

/// Duplicate handling policy, checked once at enqueue time.
///
/// Only "skip" has behavior; any other configured value downloads
/// unconditionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum DuplicatePolicy {
    /// If a file already exists at the resolved path, create the job
    /// already Completed with no network work.
    Skip,
    /// Download regardless of existing files.
    #[default]
    AlwaysDownload,
}

impl DuplicatePolicy {
    /// Parses a configured policy string.
    #[must_use]
    pub fn from_config(value: &str) -> Self {
        if value.eq_ignore_ascii_case("skip") {
            Self::Skip
        } else {
            Self::AlwaysDownload
        }
    }
}

impl From<String> for DuplicatePolicy {
    fn from(value: String) -> Self {
        Self::from_config(&value)
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Requested number of simultaneous active transfers. Clamped to
    /// [`MIN_CONCURRENCY`]..=[`MAX_CONCURRENCY`] when applied.
    pub concurrency: usize,
    /// Overall network timeout per transfer, in seconds.
    pub network_timeout_secs: u64,
    /// What to do when the destination file already exists at enqueue time.
    pub duplicate_policy: DuplicatePolicy,
    /// Whether to write a sidecar metadata file next to completed
    /// downloads.
    pub write_sidecars: bool,
    /// Destination template for standalone downloads.
    pub file_template: String,
    /// Destination template for grouped downloads.
    pub pool_file_template: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            network_timeout_secs: DEFAULT_TIMEOUT_SECS,
            duplicate_policy: DuplicatePolicy::default(),
            write_sidecars: false,
            file_template: DEFAULT_FILE_TEMPLATE.to_string(),
            pool_file_template: DEFAULT_POOL_FILE_TEMPLATE.to_string(),
        }
    }
}

impl Settings {
    /// Concurrency ceiling clamped to the supported range.
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
    }

    /// Overall per-transfer network timeout.
    #[must_use]
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }
}
