//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use mediagrab_core::settings::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};

/// Download remote media artifacts to local storage.
///
/// URLs passed on the command line are enqueued as "direct" media items;
/// with `--pool` they are grouped under one aggregate job.
#[derive(Parser, Debug)]
#[command(name = "mediagrab")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// Destination directory
    #[arg(short, long, default_value = "./downloads")]
    pub out: PathBuf,

    /// Maximum simultaneous active transfers (1-4)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(MIN_CONCURRENCY as i64..=MAX_CONCURRENCY as i64))]
    pub concurrency: u8,

    /// Download the URLs as one named group (aggregate job)
    #[arg(short, long, value_name = "LABEL")]
    pub pool: Option<String>,

    /// Skip downloads whose destination file already exists
    #[arg(long)]
    pub skip_existing: bool,

    /// Write a JSON sidecar next to each completed download
    #[arg(long)]
    pub sidecar: bool,

    /// Overall network timeout per transfer, in seconds
    #[arg(long, default_value_t = 300)]
    pub timeout: u64,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
