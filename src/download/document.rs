//! Multi-image paged-document composition.
//!
//! Comic chapters resolve into an ordered list of page-image URLs. Instead
//! of saving loose images, the composer fetches each page, decodes it, and
//! lays every image on its own PDF page sized to the image, producing a
//! single document as the final sink content. Page fetches use a bounded
//! per-image retry that is independent of the task-level retry budget.

use std::time::Duration;

use printpdf::image_crate::{DynamicImage, GenericImageView};
use printpdf::{Image, ImageTransform, Mm, PdfDocument, Px};
use reqwest::Client;
use reqwest::header::COOKIE;
use tracing::{debug, instrument, warn};

use super::engine::ProgressFn;
use super::DownloadError;
use crate::task::DownloadTask;

/// Attempts per page image, independent of the task-level retry budget.
const PAGE_FETCH_ATTEMPTS: u32 = 3;

/// Fixed delay between per-image attempts.
const PAGE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Render resolution for embedded images.
const DOCUMENT_DPI: f32 = 96.0;

/// Fetches page images and composes them into a single PDF.
pub struct DocumentComposer {
    client: Client,
}

impl std::fmt::Debug for DocumentComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentComposer").finish_non_exhaustive()
    }
}

impl DocumentComposer {
    /// Creates a composer sharing the engine's HTTP client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetches every page of a document task and returns the composed PDF
    /// bytes.
    ///
    /// All pages are fetched before assembly starts: the PDF handle is not
    /// `Send`, so it must never live across an await point in a spawned
    /// worker. `on_progress` is invoked once per fetched page. Decoded image
    /// buffers are dropped as soon as their page has been embedded.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Document`] when the task carries no pages,
    /// a page fails to decode, or PDF assembly fails; network errors from an
    /// exhausted per-image retry are returned as-is.
    #[instrument(skip(self, task, on_progress), fields(task_id = %task.id, pages = task.document_pages.len()))]
    pub async fn compose(
        &self,
        task: &DownloadTask,
        on_progress: ProgressFn<'_>,
    ) -> Result<Vec<u8>, DownloadError> {
        let total = task.document_pages.len();
        if total == 0 {
            return Err(DownloadError::document("document task carries no pages"));
        }

        let mut raw_pages = Vec::with_capacity(total);
        for (index, page_url) in task.document_pages.iter().enumerate() {
            raw_pages.push(self.fetch_page(task, page_url).await?);
            on_progress(page_percent(index + 1, total));
        }

        let title = task
            .file_name
            .rsplit_once('.')
            .map_or(task.file_name.as_str(), |(stem, _)| stem);
        assemble_document(title, &task.document_pages, raw_pages)
    }

    /// Fetches one page image with the bounded per-image retry.
    async fn fetch_page(
        &self,
        task: &DownloadTask,
        page_url: &str,
    ) -> Result<Vec<u8>, DownloadError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.fetch_page_once(task, page_url).await {
                Ok(bytes) => return Ok(bytes),
                Err(error) => {
                    if attempt >= PAGE_FETCH_ATTEMPTS {
                        return Err(error);
                    }
                    warn!(
                        url = %page_url,
                        attempt,
                        error = %error,
                        "page fetch failed, retrying"
                    );
                    tokio::time::sleep(PAGE_RETRY_DELAY).await;
                }
            }
        }
    }

    async fn fetch_page_once(
        &self,
        task: &DownloadTask,
        page_url: &str,
    ) -> Result<Vec<u8>, DownloadError> {
        let mut request = self.client.get(page_url);
        for (name, value) in &task.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(cookie) = task.cookie_header() {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(page_url)
            } else {
                DownloadError::network(page_url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(page_url, status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DownloadError::network(page_url, e))?;
        debug!(url = %page_url, bytes = bytes.len(), "fetched document page");
        Ok(bytes.to_vec())
    }
}

/// Decodes the fetched pages and lays each on its own PDF page.
///
/// Synchronous on purpose: the document handle is created and consumed
/// without an intervening await.
fn assemble_document(
    title: &str,
    page_urls: &[String],
    raw_pages: Vec<Vec<u8>>,
) -> Result<Vec<u8>, DownloadError> {
    let mut pages = page_urls.iter().zip(raw_pages);
    let Some((first_url, first_raw)) = pages.next() else {
        return Err(DownloadError::document("document task carries no pages"));
    };
    let first_image = decode_page(first_url, &first_raw)?;
    drop(first_raw);

    let (width_mm, height_mm) = page_size_mm(&first_image);
    let (doc, first_page, first_layer) = PdfDocument::new(title, width_mm, height_mm, "page 1");
    Image::from_dynamic_image(&first_image).add_to_layer(
        doc.get_page(first_page).get_layer(first_layer),
        page_transform(),
    );
    drop(first_image);

    for (index, (page_url, raw)) in pages.enumerate() {
        let image = decode_page(page_url, &raw)?;
        drop(raw);

        let (width_mm, height_mm) = page_size_mm(&image);
        let (page, layer) = doc.add_page(width_mm, height_mm, format!("page {}", index + 2));
        Image::from_dynamic_image(&image)
            .add_to_layer(doc.get_page(page).get_layer(layer), page_transform());
        drop(image);
    }

    doc.save_to_bytes()
        .map_err(|e| DownloadError::document(format!("failed to assemble PDF: {e}")))
}

fn decode_page(page_url: &str, raw: &[u8]) -> Result<DynamicImage, DownloadError> {
    printpdf::image_crate::load_from_memory(raw)
        .map_err(|e| DownloadError::document(format!("failed to decode {page_url}: {e}")))
}

/// PDF page size matching the image at the document render resolution.
fn page_size_mm(image: &DynamicImage) -> (Mm, Mm) {
    let (width_px, height_px) = image.dimensions();
    let width = Mm::from(Px(width_px as usize).into_pt(DOCUMENT_DPI));
    let height = Mm::from(Px(height_px as usize).into_pt(DOCUMENT_DPI));
    (width, height)
}

fn page_transform() -> ImageTransform {
    ImageTransform {
        dpi: Some(DOCUMENT_DPI),
        ..ImageTransform::default()
    }
}

fn page_percent(done: usize, total: usize) -> u8 {
    let percent = done.saturating_mul(100) / total.max(1);
    u8::try_from(percent.min(100)).unwrap_or(100)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::task::{MediaKind, Platform};

    // Smallest valid 1x1 PNG.
    const PNG_1X1: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
        0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00,
        0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0B, 0x49, 0x44, 0x41, 0x54, 0x78,
        0x9C, 0x63, 0x60, 0x00, 0x02, 0x00, 0x00, 0x05, 0x00, 0x01, 0x7A, 0x5E, 0xAB, 0x3F,
        0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    #[test]
    fn test_page_percent_progression() {
        assert_eq!(page_percent(1, 4), 25);
        assert_eq!(page_percent(4, 4), 100);
        assert_eq!(page_percent(0, 0), 0);
    }

    #[test]
    fn test_decode_page_rejects_garbage() {
        let result = decode_page("https://example.com/p1.jpg", b"not an image");
        assert!(matches!(result, Err(DownloadError::Document { .. })));
    }

    #[test]
    fn test_decode_page_accepts_png() {
        let image = decode_page("https://example.com/p1.png", PNG_1X1);
        assert!(image.is_ok());
        assert_eq!(image.unwrap().dimensions(), (1, 1));
    }

    #[test]
    fn test_assemble_document_produces_pdf_bytes() {
        let urls = vec![
            "https://example.com/p1.png".to_string(),
            "https://example.com/p2.png".to_string(),
        ];
        let raw = vec![PNG_1X1.to_vec(), PNG_1X1.to_vec()];
        let bytes = assemble_document("chapter 12", &urls, raw).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_assemble_document_rejects_undecodable_page() {
        let urls = vec![
            "https://example.com/p1.png".to_string(),
            "https://example.com/p2.png".to_string(),
        ];
        let raw = vec![PNG_1X1.to_vec(), b"not an image".to_vec()];
        let result = assemble_document("chapter 12", &urls, raw);
        assert!(matches!(result, Err(DownloadError::Document { .. })));
    }

    // Workers run inside tokio::spawn, so the compose future must be Send.
    // This only has to compile.
    #[test]
    fn test_compose_future_is_send() {
        fn require_send<F: Send>(_: F) {}

        let composer = DocumentComposer::new(Client::new());
        let task = DownloadTask::new(
            "https://example.com/p1.png",
            Platform::Kuaikan,
            MediaKind::Document,
            PathBuf::from("/tmp"),
            "chapter 12.pdf",
        )
        .with_document_pages(vec!["https://example.com/p1.png".to_string()]);
        require_send(composer.compose(&task, &|_| {}));
    }
}
