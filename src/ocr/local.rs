//! Local text-extraction provider.
//!
//! PDFs are read through their embedded text layer with lopdf; no OCR model
//! runs in-process. Images are header-validated and yield a degraded
//! placeholder so the rest of the pipeline keeps working without a model.

use std::path::Path;

use tracing::{info, warn};

use super::{extension_of, OcrError, OcrProvider, SUPPORTED_EXTENSIONS};

pub struct LocalTextProvider;

#[async_trait::async_trait]
impl OcrProvider for LocalTextProvider {
    fn name(&self) -> &str {
        "local_text"
    }

    async fn extract_text(&self, path: &Path) -> Result<String, OcrError> {
        if !path.exists() {
            return Err(OcrError::NotFound(path.to_path_buf()));
        }

        let ext = extension_of(path).unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(OcrError::UnsupportedFormat(ext));
        }

        match ext.as_str() {
            "pdf" => {
                // lopdf parsing is CPU-bound; keep it off the async threads.
                let pdf_path = path.to_path_buf();
                let text = tokio::task::spawn_blocking(move || extract_pdf_text(&pdf_path))
                    .await
                    .map_err(|e| OcrError::Extraction(format!("PDF task failed: {}", e)))??;

                if text.trim().is_empty() {
                    warn!("no text layer found in PDF - might be image-based");
                    return Ok("No text found in PDF - document may be image-based".to_string());
                }
                info!("extracted {} characters from PDF text layer", text.len());
                Ok(text)
            }
            _ => extract_image_placeholder(path),
        }
    }
}

/// Extract text from a PDF's embedded text layer using lopdf.
fn extract_pdf_text(path: &Path) -> Result<String, OcrError> {
    let doc = lopdf::Document::load(path)
        .map_err(|e| OcrError::Extraction(format!("failed to load PDF: {}", e)))?;

    let mut text = String::new();
    for (page_num, _) in doc.get_pages() {
        if let Ok(content) = doc.extract_text(&[page_num]) {
            if !content.trim().is_empty() {
                text.push_str(&format!("--- Page {} ---\n{}\n\n", page_num, content));
            }
        }
    }

    Ok(text.trim().to_string())
}

/// Validate an image header and return a degraded placeholder.
///
/// Undecodable image bytes are a real extraction failure; a valid image we
/// simply have no model for is degraded output by contract.
fn extract_image_placeholder(path: &Path) -> Result<String, OcrError> {
    let (width, height) = image::image_dimensions(path)
        .map_err(|e| OcrError::Extraction(format!("failed to read image: {}", e)))?;

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image");
    warn!(
        "no local OCR model for images - returning placeholder for {} ({}x{})",
        filename, width, height
    );
    Ok(format!(
        "Text extraction unavailable for {} - no OCR model configured",
        filename
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let provider = LocalTextProvider;
        let result = provider
            .extract_text(Path::new("/nonexistent/invoice.pdf"))
            .await;
        assert!(matches!(result, Err(OcrError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unsupported_extension_rejected() {
        let mut file = tempfile::Builder::new().suffix(".docx").tempfile().unwrap();
        file.write_all(b"not a supported format").unwrap();

        let provider = LocalTextProvider;
        let result = provider.extract_text(file.path()).await;
        assert!(matches!(result, Err(OcrError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_corrupt_image_fails_extraction() {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(b"definitely not a png").unwrap();

        let provider = LocalTextProvider;
        let result = provider.extract_text(file.path()).await;
        assert!(matches!(result, Err(OcrError::Extraction(_))));
    }

    #[tokio::test]
    async fn test_corrupt_pdf_fails_extraction() {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(b"%PDF-garbage").unwrap();

        let provider = LocalTextProvider;
        let result = provider.extract_text(file.path()).await;
        assert!(matches!(result, Err(OcrError::Extraction(_))));
    }
}
