//! Job model and in-memory registry.
//!
//! A [`DownloadJob`] is the unit of work: one media item's transfer to local
//! storage. The [`JobRegistry`] is the only structure shared across
//! concurrent executors and supports safe insert/update/enumerate.

mod record;
mod registry;

pub use record::{DownloadJob, GroupType, JobId, JobStatus, MediaRef};
pub use registry::JobRegistry;
