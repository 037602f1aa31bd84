//! Modular OCR provider abstraction.
//!
//! Defines the [`OcrProvider`] trait so different text-extraction backends
//! (local PDF text layer, HTTP OCR sidecar) can be swapped via environment
//! configuration. OCR quality is out of scope for this service: a provider
//! may return a degraded placeholder string when it has no model for an
//! input, and the pipeline treats that as normal text.

pub mod local;
pub mod remote;

use std::path::{Path, PathBuf};

/// Failure inside an OCR backend.
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to extract text: {0}")]
    Extraction(String),
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn extract_text(&self, path: &Path) -> Result<String, OcrError>;
}

/// File extensions a provider must accept.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg"];

pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}
