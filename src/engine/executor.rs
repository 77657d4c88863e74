//! Single-job execution: claim, resolve, stream, finalize.
//!
//! One invocation owns one job from claim to a terminal or interrupted
//! state. The admission permit is held for the whole transfer and released
//! on every exit path (RAII). Pause/Cancel are observed cooperatively at
//! chunk boundaries only; an in-flight read is bounded by the transport
//! timeout, not by the stop signal.

use std::sync::Arc;
use std::time::SystemTime;

use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use super::EngineInner;
use super::error::ExecuteError;
use crate::job::{JobId, JobStatus};
use crate::path;
use crate::resolver::ResolveError;
use crate::sidecar;

/// How a transfer loop ended without error.
enum TransferOutcome {
    /// The stream was drained; the job should be marked Completed.
    Finished,
    /// A cooperative stop (Paused/Cancelled) was observed; the status was
    /// already set externally and the partial file stays on disk as-is.
    Interrupted(JobStatus),
}

/// Executes one job end to end. Never returns an error: failures are
/// captured on the job record and notified.
#[instrument(skip(inner), fields(job_id = %id))]
pub(crate) async fn execute_job(inner: Arc<EngineInner>, id: JobId) {
    // Guard: only a Queued job may start; anything else was already claimed
    // or superseded between scan and dispatch.
    if inner.registry.status(id) != Some(JobStatus::Queued) {
        debug!("job no longer queued, skipping");
        return;
    }

    // Admission gate: the sole backpressure point. Excess launches block
    // here until a slot frees.
    let Ok(_permit) = inner.gate.acquire().await else {
        warn!("admission gate closed, skipping job");
        return;
    };

    // The wait for admission can be long; re-claim atomically so a job
    // cancelled in the meantime never starts.
    if !inner
        .registry
        .transition(id, JobStatus::Queued, JobStatus::Downloading)
    {
        debug!("job left queued state while waiting for admission");
        return;
    }
    inner
        .registry
        .update(id, |job| job.started_at = Some(SystemTime::now()));
    inner.hub.notify_status(id, JobStatus::Downloading);

    match run_transfer(&inner, id).await {
        Ok(TransferOutcome::Finished) => {
            // Pause/Cancel can land while the final stream read is in
            // flight, after the last chunk-boundary check. Finalizing goes
            // through the same atomic claim as starting, so a status set in
            // that window is never overwritten.
            let completed = inner.registry.update_where(
                id,
                |job| job.status == JobStatus::Downloading,
                |job| {
                    job.status = JobStatus::Completed;
                    job.completed_at = Some(SystemTime::now());
                },
            );
            if !completed {
                debug!("job left downloading during the final read, keeping its status");
                return;
            }
            if let Some(job) = inner.registry.get(id) {
                info!(
                    bytes = job.bytes_downloaded,
                    path = %job.destination_path.display(),
                    "download completed"
                );
                if inner.settings.write_sidecars {
                    // Sidecar hand-off is best-effort; a failure here never
                    // fails the job.
                    if let Err(error) = sidecar::write_sidecar(&job) {
                        warn!(error = %error, "failed to write sidecar");
                    }
                }
            }
            inner.hub.notify_status(id, JobStatus::Completed);
        }
        Ok(TransferOutcome::Interrupted(status)) => {
            debug!(status = %status, "transfer stopped cooperatively");
        }
        Err(error) => {
            warn!(error = %error, "download failed");
            let failed = inner.registry.update_where(
                id,
                |job| job.status == JobStatus::Downloading,
                |job| {
                    job.status = JobStatus::Failed;
                    job.error_message = Some(error.to_string());
                },
            );
            if failed {
                inner.hub.notify_status(id, JobStatus::Failed);
            } else {
                debug!("job left downloading before the failure landed, keeping its status");
            }
        }
    }
    // _permit drops here, releasing the admission slot.
}

/// Resolves, opens, and streams the content into the destination file.
async fn run_transfer(inner: &Arc<EngineInner>, id: JobId) -> Result<TransferOutcome, ExecuteError> {
    let Some(job) = inner.registry.get(id) else {
        debug!("job record disappeared, skipping transfer");
        return Ok(TransferOutcome::Interrupted(JobStatus::Cancelled));
    };

    // Always re-resolve: resolved links may be short-lived, so a URL from
    // enqueue time is never trusted.
    let resolved = inner
        .resolvers
        .resolve(&job.media)
        .await?
        .ok_or_else(|| ResolveError::NotAvailable {
            source_key: job.media.source.clone(),
            item_id: job.media.item_id.clone(),
        })?;

    // Rewrite only the extension portion when it was unknown at enqueue
    // time; directory and stem stay as resolved.
    let mut destination = job.destination_path.clone();
    if job.media.extension.is_none() {
        if let Some(ext) = path::extension_from_url(&resolved.url) {
            destination.set_extension(&ext);
            let rewritten = destination.clone();
            inner
                .registry
                .update(id, |job| job.destination_path = rewritten);
        }
    }

    if let Some(parent_dir) = destination.parent() {
        tokio::fs::create_dir_all(parent_dir)
            .await
            .map_err(|e| ExecuteError::io(parent_dir, e))?;
    }

    let mut fetch = inner.transport.open(&resolved.url).await?;
    let content_length = fetch.content_length();

    // Every execution restarts from byte 0: the destination file is
    // recreated, so the counter is zeroed here rather than on Resume/Retry.
    inner.registry.update(id, |job| {
        job.bytes_downloaded = 0;
        job.total_bytes = content_length;
    });

    let file = tokio::fs::File::create(&destination)
        .await
        .map_err(|e| ExecuteError::io(&destination, e))?;
    let mut writer = BufWriter::new(file);
    let mut bytes_written: u64 = 0;

    loop {
        // Ownership check before each chunk: anything other than Downloading
        // (pause, cancel, or a competing claim after a fast pause/resume)
        // ends this transfer.
        let status = inner.registry.status(id);
        if status != Some(JobStatus::Downloading) {
            writer
                .flush()
                .await
                .map_err(|e| ExecuteError::io(&destination, e))?;
            return Ok(TransferOutcome::Interrupted(
                status.unwrap_or(JobStatus::Cancelled),
            ));
        }

        let Some(chunk) = fetch.chunk().await? else {
            break;
        };
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| ExecuteError::io(&destination, e))?;
        bytes_written += chunk.len() as u64;

        // Keep bytes <= total observable at every instant; a short
        // content-length hint is corrected upward.
        let total = if content_length > 0 {
            content_length.max(bytes_written)
        } else {
            0
        };
        inner.registry.update(id, |job| {
            job.bytes_downloaded = bytes_written;
            job.total_bytes = total;
        });
        inner.hub.notify_progress(id, bytes_written, total);
    }

    writer
        .flush()
        .await
        .map_err(|e| ExecuteError::io(&destination, e))?;
    Ok(TransferOutcome::Finished)
}
