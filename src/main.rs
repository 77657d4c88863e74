//! CLI entry point for the mediagrab tool.

use std::io::{self, IsTerminal, Read};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use mediagrab_core::{
    DirectResolver, DownloadEngine, DuplicatePolicy, GroupType, JobStatus, MediaRef,
    ResolverRegistry, Settings,
};
use tracing::{debug, info, warn};

mod cli;
mod progress;

use cli::Args;
use progress::spawn_progress_ui;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    // Read input: from positional args or stdin
    let urls: Vec<String> = if args.urls.is_empty() && !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    } else {
        args.urls.clone()
    };

    if urls.is_empty() {
        info!("No input provided. Pipe URLs via stdin or pass as arguments.");
        info!("Example: echo 'https://example.com/cat.png' | mediagrab");
        return Ok(());
    }

    let settings = Settings {
        concurrency: usize::from(args.concurrency),
        network_timeout_secs: args.timeout,
        duplicate_policy: if args.skip_existing {
            DuplicatePolicy::Skip
        } else {
            DuplicatePolicy::AlwaysDownload
        },
        write_sidecars: args.sidecar,
        ..Settings::default()
    };

    let mut resolvers = ResolverRegistry::new();
    resolvers.register(Box::new(DirectResolver::new()));
    let engine = DownloadEngine::new(settings, resolvers);

    let items: Vec<MediaRef> = urls.iter().map(|url| media_from_url(url)).collect();
    let total = items.len();

    if let Some(label) = &args.pool {
        let aggregate_id = engine.enqueue_aggregate(GroupType::Pool, items, &args.out, label);
        info!(aggregate_id = %aggregate_id, members = total, "pool enqueued");
    } else {
        let ids = engine.enqueue_many(items, &args.out);
        info!(jobs = ids.len(), "downloads enqueued");
    }

    let scheduler = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_scheduler().await })
    };

    let use_spinner = !args.quiet && io::stdout().is_terminal();
    let (spinner_handle, spinner_stop) = spawn_progress_ui(use_spinner, engine.clone(), total);

    // One-shot pipeline mode: run until every non-aggregate job is terminal.
    loop {
        let jobs = engine.list_jobs();
        let all_done = jobs
            .iter()
            .filter(|job| !job.is_aggregate)
            .all(|job| job.status.is_terminal());
        if all_done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    engine.shutdown();
    let _ = scheduler.await;
    spinner_stop.store(true, std::sync::atomic::Ordering::SeqCst);
    if let Some(handle) = spinner_handle {
        let _ = handle.await;
    }

    let jobs = engine.list_jobs();
    let completed = jobs
        .iter()
        .filter(|job| !job.is_aggregate && job.status == JobStatus::Completed)
        .count();
    let failed: Vec<_> = jobs
        .iter()
        .filter(|job| !job.is_aggregate && job.status == JobStatus::Failed)
        .collect();

    for job in &failed {
        warn!(
            job_id = %job.id,
            item = %job.media.item_id,
            error = job.error_message.as_deref().unwrap_or("unknown"),
            "download failed"
        );
    }
    info!(completed, failed = failed.len(), total, "run finished");

    if !failed.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

/// Builds a "direct" media reference from a raw URL, deriving title and
/// extension from the last path segment when possible.
fn media_from_url(url: &str) -> MediaRef {
    let parsed = url::Url::parse(url).ok();
    let last_segment = parsed
        .as_ref()
        .and_then(|u| u.path_segments())
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("")
        .to_string();
    let (title, extension) = match last_segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() && ext.len() <= 11 => {
            (stem.to_string(), Some(ext.to_lowercase()))
        }
        _ => (last_segment.clone(), None),
    };

    MediaRef {
        source: "direct".to_string(),
        item_id: url.to_string(),
        title: if title.is_empty() {
            "download".to_string()
        } else {
            title
        },
        artist: String::new(),
        extension,
    }
}
