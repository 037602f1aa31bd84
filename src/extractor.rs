//! Invoice extraction pipeline.
//!
//! The top-level request flow: validate upload → fingerprint → cache lookup
//! (hit short-circuits all OCR/AI work) → spool to temp file → OCR → prompt
//! → breaker-guarded retrying AI call → normalize/validate → best-effort
//! cache write. One pipeline instance is built at startup and shared by
//! every request; the circuit breaker inside it is the single process-wide
//! guard for the AI dependency.

use std::io::Write;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::ai::AiClient;
use crate::breaker::{BreakerError, CircuitBreaker};
use crate::cache::ResultCache;
use crate::error::AppError;
use crate::fingerprint::fingerprint;
use crate::normalize;
use crate::ocr::OcrProvider;
use crate::prompt::build_extraction_prompt;
use crate::retry::RetryPolicy;
use crate::schema::InvoiceData;

/// Default upload size limit (10MB).
pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Png,
    Jpeg,
}

impl FileKind {
    /// Detect the format from magic bytes, falling back to the declared
    /// content type, then the filename extension.
    pub fn detect(bytes: &[u8], content_type: Option<&str>, filename: &str) -> Option<Self> {
        Self::sniff(bytes)
            .or_else(|| content_type.and_then(Self::from_content_type))
            .or_else(|| Self::from_filename(filename))
    }

    fn sniff(bytes: &[u8]) -> Option<Self> {
        infer::get(bytes).and_then(|kind| Self::from_content_type(kind.mime_type()))
    }

    fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            "application/pdf" => Some(Self::Pdf),
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    fn from_filename(filename: &str) -> Option<Self> {
        let ext = filename.rsplit_once('.').map(|(_, e)| e.to_lowercase())?;
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Pdf => ".pdf",
            Self::Png => ".png",
            Self::Jpeg => ".jpg",
        }
    }
}

/// An upload handed to the pipeline by a transport handler.
#[derive(Debug)]
pub struct Upload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Extraction pipeline orchestrator.
pub struct ExtractionPipeline {
    ocr: Arc<dyn OcrProvider>,
    ai: Arc<dyn AiClient>,
    cache: Arc<dyn ResultCache>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    max_file_size: usize,
}

impl ExtractionPipeline {
    pub fn new(
        ocr: Arc<dyn OcrProvider>,
        ai: Arc<dyn AiClient>,
        cache: Arc<dyn ResultCache>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        max_file_size: usize,
    ) -> Self {
        Self {
            ocr,
            ai,
            cache,
            breaker,
            retry,
            max_file_size,
        }
    }

    pub fn ocr_provider_name(&self) -> &str {
        self.ocr.name()
    }

    /// Run the full extraction flow for one upload.
    pub async fn extract(&self, upload: Upload) -> Result<InvoiceData, AppError> {
        let kind = self.validate(&upload)?;

        let file_hash = fingerprint(&upload.bytes);
        info!(
            "file hash calculated: {}... for {}",
            &file_hash[..8],
            upload.filename
        );

        // Cache hit short-circuits all OCR and AI work.
        if let Some(cached) = self.cache.get(&file_hash).await {
            info!("returning cached result for {}", upload.filename);
            return Ok(cached);
        }

        // The temp file hands bytes to the OCR collaborator; its Drop
        // removes it on every exit path, including early error returns.
        let temp_file = spool_to_temp(&upload.bytes, kind)?;

        info!(
            "processing file: {} ({:?}) - {} bytes",
            upload.filename,
            kind,
            upload.bytes.len()
        );

        let extracted_text = self
            .ocr
            .extract_text(temp_file.path())
            .await
            .map_err(AppError::from)?;
        if extracted_text.trim().is_empty() {
            return Err(AppError::OcrFailed {
                detail: Some("no text extracted from document".to_string()),
            });
        }
        info!(
            "extracted {} characters from {}",
            extracted_text.len(),
            upload.filename
        );

        let prompt = build_extraction_prompt(&extracted_text, &[]);
        debug!("generated prompt length: {} characters", prompt.len());

        // The breaker wraps the whole retrying operation: repeated transient
        // failures count as one breaker decision per logical request.
        let outcome = self
            .breaker
            .call(|| self.retry.run(|| self.ai.complete(&prompt)))
            .await;

        let response_text = match outcome {
            Ok(text) => text,
            Err(BreakerError::Open) => return Err(AppError::CircuitOpen),
            Err(BreakerError::Service(err)) => return Err(AppError::from(err)),
        };

        if response_text.trim().is_empty() {
            return Err(AppError::EmptyAiResponse);
        }
        debug!("raw AI response length: {} chars", response_text.len());

        let record = normalize::normalize(&response_text).map_err(AppError::from)?;
        info!("successfully validated invoice data for {}", upload.filename);

        // Best-effort: a failed write degrades to "no caching".
        if !self.cache.set(&file_hash, &record).await {
            debug!("cache write skipped for {}...", &file_hash[..8]);
        }

        if let Err(e) = temp_file.close() {
            warn!("failed to clean up temporary file: {}", e);
        }

        Ok(record)
    }

    /// Upload validation: runs before any fingerprint, OCR, or AI work.
    fn validate(&self, upload: &Upload) -> Result<FileKind, AppError> {
        if upload.bytes.is_empty() {
            return Err(AppError::invalid_input("no file data provided"));
        }
        if upload.bytes.len() > self.max_file_size {
            return Err(AppError::invalid_input_with_detail(
                format!(
                    "File too large. Maximum size allowed: {}MB",
                    self.max_file_size / (1024 * 1024)
                ),
                format!("File size: {} bytes", upload.bytes.len()),
            ));
        }

        FileKind::detect(
            &upload.bytes,
            upload.content_type.as_deref(),
            &upload.filename,
        )
        .ok_or_else(|| {
            AppError::invalid_input_with_detail(
                format!(
                    "Invalid file type: {}",
                    upload.content_type.as_deref().unwrap_or("unknown")
                ),
                "Supported types: application/pdf, image/png, image/jpeg",
            )
        })
    }
}

fn spool_to_temp(bytes: &[u8], kind: FileKind) -> Result<tempfile::NamedTempFile, AppError> {
    let mut temp_file = tempfile::Builder::new()
        .prefix("invoice-upload-")
        .suffix(kind.suffix())
        .tempfile()
        .map_err(|e| AppError::internal(format!("failed to create temporary file: {}", e)))?;
    temp_file
        .write_all(bytes)
        .map_err(|e| AppError::internal(format!("failed to write temporary file: {}", e)))?;
    debug!("spooled upload to {:?}", temp_file.path());
    Ok(temp_file)
}
