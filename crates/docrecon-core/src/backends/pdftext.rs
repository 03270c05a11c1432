//! Embedded-PDF text source.
//!
//! A local [`TextSource`] implementation for text-based PDFs: no OCR, just
//! the embedded text layer. Scanned PDFs come back empty here and must go to
//! a real OCR backend instead.

use async_trait::async_trait;
use lopdf::Document;
use tracing::debug;

use crate::error::BackendError;

use super::TextSource;

/// Extracts the embedded text layer of a PDF.
pub struct PdfTextSource {
    /// Minimum characters for the text layer to count as usable.
    min_text_length: usize,
}

impl PdfTextSource {
    pub fn new() -> Self {
        Self { min_text_length: 50 }
    }

    pub fn with_min_text_length(mut self, min: usize) -> Self {
        self.min_text_length = min;
        self
    }

    fn extract_sync(&self, bytes: &[u8]) -> Result<String, BackendError> {
        // Structural checks first: encryption and page count.
        let doc = Document::load_mem(bytes).map_err(|e| BackendError::Service {
            service: "pdf-text",
            reason: format!("failed to parse PDF: {}", e),
        })?;

        if doc.is_encrypted() {
            return Err(BackendError::Service {
                service: "pdf-text",
                reason: "PDF is encrypted".to_string(),
            });
        }
        if doc.get_pages().is_empty() {
            return Err(BackendError::Service {
                service: "pdf-text",
                reason: "PDF has no pages".to_string(),
            });
        }

        let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
            BackendError::Service {
                service: "pdf-text",
                reason: format!("text extraction failed: {}", e),
            }
        })?;

        let trimmed = text.trim();
        if trimmed.len() < self.min_text_length {
            // Likely a scanned document with no text layer.
            return Err(BackendError::Empty { service: "pdf-text" });
        }

        debug!("extracted {} chars of embedded PDF text", trimmed.len());
        Ok(text)
    }
}

impl Default for PdfTextSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextSource for PdfTextSource {
    async fn extract_text(&self, bytes: &[u8], mime_type: &str) -> Result<String, BackendError> {
        if mime_type == "text/plain" {
            let text = String::from_utf8_lossy(bytes).into_owned();
            if text.trim().is_empty() {
                return Err(BackendError::Empty { service: "pdf-text" });
            }
            return Ok(text);
        }

        if mime_type != "application/pdf" {
            return Err(BackendError::Service {
                service: "pdf-text",
                reason: format!("unsupported mime type: {}", mime_type),
            });
        }

        self.extract_sync(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plain_text_passthrough() {
        let source = PdfTextSource::new();
        let text = source
            .extract_text(b"FAKTURA VAT nr 1/2025", "text/plain")
            .await
            .unwrap();
        assert!(text.contains("FAKTURA"));
    }

    #[tokio::test]
    async fn test_empty_text_is_error() {
        let source = PdfTextSource::new();
        let result = source.extract_text(b"   ", "text/plain").await;
        assert!(matches!(result, Err(BackendError::Empty { .. })));
    }

    #[tokio::test]
    async fn test_garbage_pdf_is_error() {
        let source = PdfTextSource::new();
        let result = source.extract_text(b"not a pdf", "application/pdf").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unsupported_mime_is_error() {
        let source = PdfTextSource::new();
        let result = source.extract_text(b"...", "image/tiff").await;
        assert!(matches!(result, Err(BackendError::Service { .. })));
    }
}
