//! Media Download Orchestration Engine
//!
//! This library fetches remote media artifacts and writes them to local
//! storage under user-controlled concurrency, with grouped ("pool")
//! downloads tracked as a single logical unit.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`job`] - Job records and the thread-safe in-memory registry
//! - [`engine`] - Scheduler, executor, and aggregate rollup coordinator
//! - [`events`] - Status/progress notification channels
//! - [`resolver`] - Media resolution seam (source adapters)
//! - [`path`] - Destination templating and sanitization
//! - [`transport`] - Streaming HTTP fetch
//! - [`settings`] - Engine configuration
//! - [`sidecar`] - Metadata files written next to completed downloads

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod engine;
pub mod events;
pub mod job;
pub mod path;
pub mod resolver;
pub mod settings;
pub mod sidecar;
pub mod transport;

// Re-export commonly used types
pub use engine::{DownloadEngine, ExecuteError};
pub use events::{NotificationHub, ProgressEvent, StatusEvent};
pub use job::{DownloadJob, GroupType, JobId, JobRegistry, JobStatus, MediaRef};
pub use resolver::{
    CacheMaintenance, DirectResolver, MediaResolver, ResolveError, ResolvedContent,
    ResolverRegistry,
};
pub use settings::{DuplicatePolicy, Settings};
pub use transport::{HttpTransport, TransportError};
