//! Progress UI (spinner) for download runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use mediagrab_core::{DownloadEngine, JobStatus};

/// Spawns the progress UI (spinner) when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    engine: DownloadEngine,
    total: usize,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_spinner_inner(engine, total, Arc::clone(&stop));
    (Some(handle), stop)
}

fn spawn_spinner_inner(
    engine: DownloadEngine,
    total: usize,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        while !stop.load(Ordering::SeqCst) {
            let jobs = engine.list_jobs();
            let done = jobs
                .iter()
                .filter(|job| !job.is_aggregate && job.status.is_terminal())
                .count();
            let active = jobs
                .iter()
                .find(|job| !job.is_aggregate && job.status == JobStatus::Downloading);

            let message = match active {
                Some(job) if job.total_bytes > 0 => format!(
                    "[{}/{}] {} ({}/{} bytes)",
                    (done + 1).min(total),
                    total,
                    job.media.title,
                    job.bytes_downloaded,
                    job.total_bytes
                ),
                Some(job) => format!(
                    "[{}/{}] {} ({} bytes)",
                    (done + 1).min(total),
                    total,
                    job.media.title,
                    job.bytes_downloaded
                ),
                None => format!("[{done}/{total}] waiting..."),
            };
            spinner.set_message(message);
            tokio::time::sleep(Duration::from_millis(120)).await;
        }

        spinner.finish_and_clear();
    })
}
