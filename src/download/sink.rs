//! Storage sink abstraction the transfer engine writes into.
//!
//! A sink entry is allocated before any bytes are fetched, written through a
//! staging path, and either promoted on completion or deleted on failure so
//! no partial artifact survives a failed attempt.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWrite, BufWriter};
use tracing::{debug, instrument};

use super::DownloadError;
use crate::task::MediaKind;

/// Extension appended to staging files until `mark_complete` promotes them.
const STAGING_SUFFIX: &str = "part";

/// Handle to an allocated sink entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkHandle {
    /// Final path the entry is promoted to on completion.
    pub final_path: PathBuf,
    /// Staging path bytes are written to.
    pub staging_path: PathBuf,
}

impl SinkHandle {
    /// URI form of the final path, recorded on completion.
    #[must_use]
    pub fn file_uri(&self) -> String {
        self.final_path.display().to_string()
    }
}

/// Destination storage collaborator.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Reserves a destination entry for `file_name` under `folder`.
    ///
    /// Allocation must not clobber existing entries; two tasks can never
    /// claim the same logical file.
    async fn allocate(
        &self,
        file_name: &str,
        folder: &Path,
        kind: MediaKind,
    ) -> Result<SinkHandle, DownloadError>;

    /// Opens the staging entry for writing.
    async fn open_for_write(
        &self,
        handle: &SinkHandle,
    ) -> Result<Box<dyn AsyncWrite + Send + Unpin>, DownloadError>;

    /// Promotes the staging entry to its final path.
    async fn mark_complete(&self, handle: &SinkHandle) -> Result<(), DownloadError>;

    /// Removes the entry (staging and any promoted content).
    async fn delete(&self, handle: &SinkHandle) -> Result<(), DownloadError>;
}

/// Filesystem sink writing `<name>.part` staging files.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsSink;

impl FsSink {
    /// Creates a filesystem sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sink for FsSink {
    #[instrument(skip(self), fields(file_name = %file_name, folder = %folder.display()))]
    async fn allocate(
        &self,
        file_name: &str,
        folder: &Path,
        kind: MediaKind,
    ) -> Result<SinkHandle, DownloadError> {
        tokio::fs::create_dir_all(folder)
            .await
            .map_err(|e| DownloadError::io(folder.to_path_buf(), e))?;

        let sanitized = sanitize_file_name(file_name);
        let final_path = resolve_unique_path(folder, &sanitized);
        let staging_path = staging_path_for(&final_path);

        // Touch the staging file so the entry is claimed before any bytes arrive.
        File::create(&staging_path)
            .await
            .map_err(|e| DownloadError::io(staging_path.clone(), e))?;

        debug!(final_path = %final_path.display(), kind = %kind, "allocated sink entry");

        Ok(SinkHandle {
            final_path,
            staging_path,
        })
    }

    async fn open_for_write(
        &self,
        handle: &SinkHandle,
    ) -> Result<Box<dyn AsyncWrite + Send + Unpin>, DownloadError> {
        let file = File::create(&handle.staging_path)
            .await
            .map_err(|e| DownloadError::io(handle.staging_path.clone(), e))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    #[instrument(skip(self, handle), fields(path = %handle.final_path.display()))]
    async fn mark_complete(&self, handle: &SinkHandle) -> Result<(), DownloadError> {
        tokio::fs::rename(&handle.staging_path, &handle.final_path)
            .await
            .map_err(|e| DownloadError::io(handle.final_path.clone(), e))
    }

    #[instrument(skip(self, handle), fields(path = %handle.final_path.display()))]
    async fn delete(&self, handle: &SinkHandle) -> Result<(), DownloadError> {
        // Best effort on the staging file; a missing file is already deleted.
        if let Err(e) = tokio::fs::remove_file(&handle.staging_path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            return Err(DownloadError::io(handle.staging_path.clone(), e));
        }
        if let Err(e) = tokio::fs::remove_file(&handle.final_path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            return Err(DownloadError::io(handle.final_path.clone(), e));
        }
        Ok(())
    }
}

/// Replaces path separators and control characters so a server-supplied name
/// cannot escape the destination folder.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim_matches(['.', ' ']).to_string();
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed
    }
}

/// Picks a path that does not collide with an existing entry, appending
/// `_2`, `_3`, ... before the extension as needed.
fn resolve_unique_path(folder: &Path, file_name: &str) -> PathBuf {
    let candidate = folder.join(file_name);
    if !candidate.exists() && !staging_path_for(&candidate).exists() {
        return candidate;
    }

    let (stem, extension) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), Some(ext.to_string())),
        _ => (file_name.to_string(), None),
    };

    let mut suffix = 2u32;
    loop {
        let name = match &extension {
            Some(ext) => format!("{stem}_{suffix}.{ext}"),
            None => format!("{stem}_{suffix}"),
        };
        let candidate = folder.join(&name);
        if !candidate.exists() && !staging_path_for(&candidate).exists() {
            return candidate;
        }
        suffix += 1;
    }
}

fn staging_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string());
    name.push('.');
    name.push_str(STAGING_SUFFIX);
    final_path.with_file_name(name)
}
