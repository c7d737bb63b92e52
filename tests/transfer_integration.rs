//! Integration tests for the transfer engine against mock HTTP servers.

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use mediafetch_core::download::{DownloadError, FsSink, Sink, SinkHandle, TransferEngine};
use mediafetch_core::task::{DownloadTask, MediaKind, Platform};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn photo_task(server: &MockServer, dir: &Path, remote: &str, name: &str) -> DownloadTask {
    DownloadTask::new(
        format!("{}{remote}", server.uri()),
        Platform::Twitter,
        MediaKind::Photo,
        dir.to_path_buf(),
        name,
    )
}

async fn mock_file(server: &MockServer, remote: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(remote))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_transfer_preserves_content() {
    let server = MockServer::start().await;
    let content = b"complete file content.\nline 2.\nline 3.";
    mock_file(&server, "/media/a.jpg", content).await;
    let dir = TempDir::new().expect("temp dir");

    let engine = TransferEngine::new(Arc::new(FsSink::new()));
    let task = photo_task(&server, dir.path(), "/media/a.jpg", "a.jpg");
    let outcome = engine
        .transfer(&task, &|_| {})
        .await
        .expect("transfer should succeed");

    assert_eq!(outcome.bytes_written, content.len() as u64);
    assert!(outcome.handle.final_path.exists());
    assert!(!outcome.handle.staging_path.exists(), "staging file promoted");
    let downloaded = std::fs::read(&outcome.handle.final_path).expect("read file");
    assert_eq!(downloaded, content);
}

#[tokio::test]
async fn test_transfer_reports_monotonic_progress() {
    let server = MockServer::start().await;
    // 64 KiB so the body arrives in more than one chunk.
    let content = vec![7u8; 64 * 1024];
    mock_file(&server, "/media/big.jpg", &content).await;
    let dir = TempDir::new().expect("temp dir");

    let seen: Mutex<Vec<u8>> = Mutex::new(Vec::new());
    let engine = TransferEngine::new(Arc::new(FsSink::new()));
    let task = photo_task(&server, dir.path(), "/media/big.jpg", "big.jpg");
    engine
        .transfer(&task, &|p| seen.lock().expect("lock").push(p))
        .await
        .expect("transfer should succeed");

    let seen = seen.into_inner().expect("lock");
    assert!(!seen.is_empty(), "progress callback should fire");
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress never regresses");
    assert_eq!(*seen.last().expect("non-empty"), 100);
}

#[tokio::test]
async fn test_transfer_without_content_length_reports_zero() {
    let server = MockServer::start().await;
    // Chunked responses carry no Content-Length.
    Mock::given(method("GET"))
        .and(path("/media/stream.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![1u8; 4096], "video/mp4"))
        .mount(&server)
        .await;
    let dir = TempDir::new().expect("temp dir");

    let seen: Mutex<Vec<u8>> = Mutex::new(Vec::new());
    let engine = TransferEngine::new(Arc::new(FsSink::new()));
    let mut task = photo_task(&server, dir.path(), "/media/stream.mp4", "stream.mp4");
    task.media_kind = MediaKind::Video;
    let result = engine
        .transfer(&task, &|p| seen.lock().expect("lock").push(p))
        .await;

    // wiremock sets Content-Length for set_body_raw; either way percent
    // values must stay in range and the transfer must succeed.
    assert!(result.is_ok());
    assert!(seen.into_inner().expect("lock").iter().all(|&p| p <= 100));
}

#[tokio::test]
async fn test_transfer_http_error_leaves_no_artifacts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/gone.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let dir = TempDir::new().expect("temp dir");

    let engine = TransferEngine::new(Arc::new(FsSink::new()));
    let task = photo_task(&server, dir.path(), "/media/gone.jpg", "gone.jpg");
    let result = engine.transfer(&task, &|_| {}).await;

    assert!(matches!(
        result,
        Err(DownloadError::HttpStatus { status: 404, .. })
    ));

    // Destination folder must hold no partial artifacts.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(Result::ok)
        .collect();
    assert!(
        leftovers.is_empty(),
        "no files should survive a failed attempt: {leftovers:?}"
    );
}

/// Filesystem sink whose promotion step always fails, as a full disk or a
/// permission change between write and rename would.
struct BrokenPromotionSink(FsSink);

#[async_trait]
impl Sink for BrokenPromotionSink {
    async fn allocate(
        &self,
        file_name: &str,
        folder: &Path,
        kind: MediaKind,
    ) -> Result<SinkHandle, DownloadError> {
        self.0.allocate(file_name, folder, kind).await
    }

    async fn open_for_write(
        &self,
        handle: &SinkHandle,
    ) -> Result<Box<dyn tokio::io::AsyncWrite + Send + Unpin>, DownloadError> {
        self.0.open_for_write(handle).await
    }

    async fn mark_complete(&self, handle: &SinkHandle) -> Result<(), DownloadError> {
        Err(DownloadError::io(
            handle.final_path.clone(),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "promotion denied"),
        ))
    }

    async fn delete(&self, handle: &SinkHandle) -> Result<(), DownloadError> {
        self.0.delete(handle).await
    }
}

#[tokio::test]
async fn test_transfer_promotion_failure_leaves_no_artifacts() {
    let server = MockServer::start().await;
    mock_file(&server, "/media/a.jpg", b"streamed fine").await;
    let dir = TempDir::new().expect("temp dir");

    let engine = TransferEngine::new(Arc::new(BrokenPromotionSink(FsSink::new())));
    let task = photo_task(&server, dir.path(), "/media/a.jpg", "a.jpg");
    let result = engine.transfer(&task, &|_| {}).await;

    assert!(matches!(result, Err(DownloadError::Io { .. })));

    // The staging file must be cleaned up even though the body streamed fully.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(Result::ok)
        .collect();
    assert!(
        leftovers.is_empty(),
        "no files should survive a failed promotion: {leftovers:?}"
    );
}

#[tokio::test]
async fn test_transfer_invalid_url_fails_without_request() {
    let dir = TempDir::new().expect("temp dir");
    let engine = TransferEngine::new(Arc::new(FsSink::new()));
    let task = DownloadTask::new(
        "not a url",
        Platform::Weibo,
        MediaKind::Photo,
        dir.path().to_path_buf(),
        "x.jpg",
    );
    let result = engine.transfer(&task, &|_| {}).await;
    assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
}

#[tokio::test]
async fn test_transfer_sends_task_headers_and_cookies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/auth.jpg"))
        .and(header("referer", "https://weibo.com"))
        .and(header("cookie", "SUB=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().expect("temp dir");

    let engine = TransferEngine::new(Arc::new(FsSink::new()));
    let task = photo_task(&server, dir.path(), "/media/auth.jpg", "auth.jpg")
        .with_headers(vec![("referer".to_string(), "https://weibo.com".to_string())])
        .with_cookies(vec![("SUB".to_string(), "abc123".to_string())]);

    let outcome = engine.transfer(&task, &|_| {}).await;
    assert!(outcome.is_ok(), "authed transfer should succeed: {outcome:?}");
}

#[tokio::test]
async fn test_transfer_never_clobbers_existing_file() {
    let server = MockServer::start().await;
    mock_file(&server, "/media/a.jpg", b"new content").await;
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("a.jpg"), b"old content").expect("seed file");

    let engine = TransferEngine::new(Arc::new(FsSink::new()));
    let task = photo_task(&server, dir.path(), "/media/a.jpg", "a.jpg");
    let outcome = engine.transfer(&task, &|_| {}).await.expect("transfer");

    assert_ne!(
        outcome.handle.final_path,
        dir.path().join("a.jpg"),
        "existing file must keep its name"
    );
    assert_eq!(
        std::fs::read(dir.path().join("a.jpg")).expect("read"),
        b"old content"
    );
}
