//! Failure taxonomy for single-job execution.
//!
//! Any of these marks the job Failed with the rendered message captured on
//! the record; the structured variant is not preserved past that point
//! (callers needing classification re-parse the text, a known
//! simplification).

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::resolver::ResolveError;
use crate::transport::TransportError;

/// Errors that can occur while executing one download job.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// No content URL could be obtained for the media item.
    #[error("resolution failed: {0}")]
    Resolution(#[from] ResolveError),

    /// Transport-level failure (network, timeout, non-success response).
    #[error("network failure: {0}")]
    Network(#[from] TransportError),

    /// File system failure (directory creation, file create/write).
    #[error("I/O failure at {path}: {source}")]
    Io {
        /// The path where the failure occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl ExecuteError {
    /// Creates an I/O failure with path context.
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
