//! Mediafetch Core Library
//!
//! This library implements a multi-platform media download pipeline: platform
//! resolvers turn a source link into concrete downloadable items, and the
//! download pipeline transfers each item to local storage under bounded
//! concurrency with retries, progress reporting, and persisted records.
//!
//! # Architecture
//!
//! - [`resolver`] - Platform resolution (cursor and time-window crawlers plus
//!   single-shot resolvers)
//! - [`download`] - Admission control, retry supervision, transfer engine,
//!   storage sinks
//! - [`records`] - Persisted download records over SQLite
//! - [`auth`] - Session credential store (opaque, externally acquired)
//! - [`config`] - Live settings read at the top of each pipeline loop
//! - [`notify`] - Fire-and-forget notification seam
//! - [`progress`] - Cross-task progress map
//! - [`task`] - Download task descriptors and identity

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod db;
pub mod download;
pub mod notify;
pub mod progress;
pub mod records;
pub mod resolver;
pub mod task;

// Re-export commonly used types
pub use auth::{CredentialStore, LofterSession, SessionId, TwitterSession};
pub use config::{
    DEFAULT_INTER_PAGE_DELAY, DEFAULT_MAX_CONCURRENT_DOWNLOADS, DEFAULT_MAX_RETRIES, Settings,
    SettingsHandle,
};
pub use db::Database;
pub use download::{
    AdmissionController, DownloadError, FsSink, RetrySupervisor, Scheduler, Sink, SinkHandle,
    SystemProbe, TaskOutcome, TransferEngine,
};
pub use notify::{LogNotifier, Notifier};
pub use progress::ProgressMap;
pub use records::{DownloadRecord, NewRecord, RecordStatus, RecordStore};
pub use resolver::{
    ArchiveFilter, CrawlOutcome, ResolveError, ResolvedItem, Resolver, ResolverRegistry,
    build_default_resolver_registry,
};
pub use task::{DownloadTask, EnqueueKey, MediaKind, Platform};
