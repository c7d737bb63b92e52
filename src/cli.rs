//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use mediafetch_core::{DEFAULT_MAX_CONCURRENT_DOWNLOADS, DEFAULT_MAX_RETRIES};

/// Download media from supported platform links.
///
/// Mediafetch resolves a platform link (profile timeline, blog archive,
/// illustration, status, or comic chapter) into downloadable items and
/// transfers them under bounded concurrency with retries.
#[derive(Parser, Debug)]
#[command(name = "mediafetch")]
#[command(author, version, about)]
pub struct Args {
    /// Platform link to resolve and download
    pub link: String,

    /// Destination directory for downloaded files
    #[arg(short, long, default_value = "./downloads")]
    pub output: PathBuf,

    /// Maximum concurrent downloads (1-20)
    #[arg(short = 'c', long, default_value_t = DEFAULT_MAX_CONCURRENT_DOWNLOADS as u8, value_parser = clap::value_parser!(u8).range(1..=20))]
    pub concurrency: u8,

    /// Retry attempts after the first failure (0-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_RETRIES as u8, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: u8,

    /// Delay between crawler pages, in seconds
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u64).range(0..=60))]
    pub page_delay: u64,

    /// Only keep archive entries at or after this time (RFC 3339)
    #[arg(long)]
    pub since: Option<String>,

    /// Skip archive entries after this time (RFC 3339)
    #[arg(long)]
    pub until: Option<String>,

    /// Target tags for the archive crawl (repeatable)
    #[arg(short = 't', long = "tag")]
    pub tags: Vec<String>,

    /// Keep archive entries whose page carries no tags at all
    #[arg(long)]
    pub save_untagged: bool,

    /// Refuse to download unless on Wi-Fi
    #[arg(long)]
    pub wifi_only: bool,

    /// Disable completion/failure notifications in the log
    #[arg(long)]
    pub no_notifications: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
