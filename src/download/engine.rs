//! Transfer engine: streams one resolved URL into a storage sink.
//!
//! The engine allocates the sink entry before any bytes are fetched, streams
//! the response body chunk by chunk with a progress callback, and deletes
//! the partially written entry on any failure so no orphan artifact survives
//! a failed attempt. Document tasks are routed through the
//! [`DocumentComposer`](super::document::DocumentComposer) instead of the
//! streaming path.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::document::DocumentComposer;
use super::sink::{Sink, SinkHandle};
use super::DownloadError;
use crate::task::{DownloadTask, MediaKind};

/// Connect timeout for outbound transfers.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Read timeout for outbound transfers.
pub const READ_TIMEOUT_SECS: u64 = 60;

/// Result of a successful transfer.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    /// Handle of the completed sink entry.
    pub handle: SinkHandle,
    /// Bytes written to the sink.
    pub bytes_written: u64,
}

/// Progress callback invoked after every written chunk.
pub type ProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// Streams resolved URLs into sink entries.
///
/// Created once and reused across tasks to benefit from connection pooling.
pub struct TransferEngine {
    client: Client,
    sink: Arc<dyn Sink>,
    composer: DocumentComposer,
}

impl std::fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEngine").finish_non_exhaustive()
    }
}

impl TransferEngine {
    /// Creates an engine with default timeouts writing into `sink`.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self::with_timeouts(sink, CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates an engine with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the supplied timeouts.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_timeouts(sink: Arc<dyn Sink>, connect_secs: u64, read_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_secs))
            .read_timeout(Duration::from_secs(read_secs))
            .build()
            .expect("failed to build HTTP client with static configuration");
        let composer = DocumentComposer::new(client.clone());
        Self {
            client,
            sink,
            composer,
        }
    }

    /// Transfers one task into the sink.
    ///
    /// Invokes `on_progress(percent)` after every chunk; percent is 0 for
    /// the whole transfer when the server does not report a content length.
    /// Within one task, chunk writes and progress callbacks are strictly
    /// ordered.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on invalid URLs, non-2xx responses,
    /// transport failures, sink IO failures, and document composition
    /// failures. The allocated sink entry is deleted before any error is
    /// returned.
    #[instrument(skip(self, task, on_progress), fields(task_id = %task.id, url = %task.source_url))]
    pub async fn transfer(
        &self,
        task: &DownloadTask,
        on_progress: ProgressFn<'_>,
    ) -> Result<TransferOutcome, DownloadError> {
        Url::parse(&task.source_url)
            .map_err(|_| DownloadError::invalid_url(task.source_url.clone()))?;

        // Allocate the destination entry before any bytes are fetched.
        let handle = self
            .sink
            .allocate(&task.file_name, &task.dest_dir, task.media_kind)
            .await?;

        let result = match task.media_kind {
            MediaKind::Document => self.write_document(task, &handle, on_progress).await,
            MediaKind::Video | MediaKind::Photo => {
                self.stream_resource(task, &handle, on_progress).await
            }
        };

        match result {
            Ok(bytes_written) => {
                if let Err(error) = self.sink.mark_complete(&handle).await {
                    // A failed promotion must not leave the staging file behind.
                    debug!(path = %handle.final_path.display(), "cleaning up sink entry after failed promotion");
                    if let Err(cleanup_error) = self.sink.delete(&handle).await {
                        warn!(error = %cleanup_error, "failed to delete sink entry after error");
                    }
                    return Err(error);
                }
                info!(
                    path = %handle.final_path.display(),
                    bytes = bytes_written,
                    "transfer complete"
                );
                Ok(TransferOutcome {
                    handle,
                    bytes_written,
                })
            }
            Err(error) => {
                debug!(path = %handle.final_path.display(), "cleaning up sink entry after error");
                if let Err(cleanup_error) = self.sink.delete(&handle).await {
                    warn!(error = %cleanup_error, "failed to delete sink entry after error");
                }
                Err(error)
            }
        }
    }

    /// Streams a single video/photo resource into the staging entry.
    async fn stream_resource(
        &self,
        task: &DownloadTask,
        handle: &SinkHandle,
        on_progress: ProgressFn<'_>,
    ) -> Result<u64, DownloadError> {
        let mut request = self.client.get(&task.source_url);
        request = request.headers(build_header_map(&task.headers));
        if let Some(cookie) = task.cookie_header() {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(&task.source_url)
            } else {
                DownloadError::network(&task.source_url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(
                &task.source_url,
                status.as_u16(),
            ));
        }

        let content_length = response.content_length();
        let mut writer = self.sink.open_for_write(handle).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                if e.is_timeout() {
                    DownloadError::timeout(&task.source_url)
                } else {
                    DownloadError::network(&task.source_url, e)
                }
            })?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(handle.staging_path.clone(), e))?;
            written += chunk.len() as u64;
            on_progress(percent_of(written, content_length));
        }

        writer
            .shutdown()
            .await
            .map_err(|e| DownloadError::io(handle.staging_path.clone(), e))?;

        Ok(written)
    }

    /// Composes a multi-image document and writes it as the sink content.
    async fn write_document(
        &self,
        task: &DownloadTask,
        handle: &SinkHandle,
        on_progress: ProgressFn<'_>,
    ) -> Result<u64, DownloadError> {
        let bytes = self.composer.compose(task, on_progress).await?;

        let mut writer = self.sink.open_for_write(handle).await?;
        writer
            .write_all(&bytes)
            .await
            .map_err(|e| DownloadError::io(handle.staging_path.clone(), e))?;
        writer
            .shutdown()
            .await
            .map_err(|e| DownloadError::io(handle.staging_path.clone(), e))?;

        Ok(bytes.len() as u64)
    }
}

/// Percentage written, or 0 when the total length is unknown.
fn percent_of(written: u64, total: Option<u64>) -> u8 {
    match total {
        Some(total) if total > 0 => {
            let percent = written.saturating_mul(100) / total;
            u8::try_from(percent.min(100)).unwrap_or(100)
        }
        _ => 0,
    }
}

/// Converts task header pairs into a reqwest header map, skipping pairs that
/// are not valid header material.
fn build_header_map(headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let Ok(name) = HeaderName::try_from(name.as_str()) else {
            warn!(header = %name, "skipping invalid header name");
            continue;
        };
        let Ok(value) = HeaderValue::try_from(value.as_str()) else {
            warn!(header = %name, "skipping invalid header value");
            continue;
        };
        map.insert(name, value);
    }
    map
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_of_known_total() {
        assert_eq!(percent_of(0, Some(200)), 0);
        assert_eq!(percent_of(50, Some(200)), 25);
        assert_eq!(percent_of(200, Some(200)), 100);
        // Never exceeds 100 even if the server lied about the total.
        assert_eq!(percent_of(400, Some(200)), 100);
    }

    #[test]
    fn test_percent_of_unknown_total_is_zero() {
        assert_eq!(percent_of(1024, None), 0);
        assert_eq!(percent_of(1024, Some(0)), 0);
    }

    #[test]
    fn test_build_header_map_skips_invalid_pairs() {
        let headers = vec![
            ("x-csrf-token".to_string(), "abc".to_string()),
            ("bad header".to_string(), "value".to_string()),
            ("referer".to_string(), "https://example.com".to_string()),
        ];
        let map = build_header_map(&headers);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("x-csrf-token").unwrap(), "abc");
    }
}
