//! JSON sidecar metadata written alongside completed downloads.
//!
//! The engine hands a completed job off here when
//! [`Settings::write_sidecars`](crate::settings::Settings) is set. The
//! sidecar records the identifying media fields so downstream tooling can
//! re-resolve or index the file without the engine's in-memory state.

use std::fs;
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::job::DownloadJob;

/// Errors produced by sidecar generation.
#[derive(Debug, Error)]
pub enum SidecarError {
    /// I/O error writing the sidecar file to disk.
    #[error("I/O error writing sidecar: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization error (shouldn't occur for well-formed structs).
    #[error("JSON serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Sidecar document root.
#[derive(Debug, Serialize)]
struct SidecarDocument<'a> {
    source: &'a str,
    item_id: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    title: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    artist: &'a str,
    bytes_downloaded: u64,
}

/// Writes a `.json` sidecar next to the downloaded file for `job`.
///
/// Returns `None` (with a `debug!` log) if the downloaded file is missing
/// on disk or the sidecar already exists (idempotent). Returns
/// `Some(sidecar_path)` on success.
///
/// # Errors
///
/// Returns [`SidecarError`] on I/O or serialization failure.
#[instrument(skip(job), fields(job_id = %job.id, destination = %job.destination_path.display()))]
pub fn write_sidecar(job: &DownloadJob) -> Result<Option<PathBuf>, SidecarError> {
    if !job.destination_path.exists() {
        debug!("downloaded file missing, skipping sidecar");
        return Ok(None);
    }
    let sidecar_path = derive_sidecar_path(&job.destination_path);

    let file = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&sidecar_path)
    {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            debug!(path = %sidecar_path.display(), "sidecar already exists, skipping");
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };

    let document = SidecarDocument {
        source: &job.media.source,
        item_id: &job.media.item_id,
        title: &job.media.title,
        artist: &job.media.artist,
        bytes_downloaded: job.bytes_downloaded,
    };
    serde_json::to_writer_pretty(BufWriter::new(file), &document)?;
    debug!(path = %sidecar_path.display(), "sidecar written");
    Ok(Some(sidecar_path))
}

/// Appends `.json` to the full file name, so `a.png` gets `a.png.json` and
/// two items differing only in extension never collide.
fn derive_sidecar_path(saved_path: &Path) -> PathBuf {
    let mut name = saved_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    name.push_str(".json");
    saved_path.with_file_name(name)
}
