//! Application failure taxonomy and its wire mapping.
//!
//! Every failure path funnels into [`AppError`] exactly once, at the
//! pipeline boundary, and every `AppError` renders as the same structured
//! JSON body. Cache failures are deliberately absent: the cache interface
//! cannot surface errors (see [`crate::cache`]).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use tracing::{error, warn};

use crate::ai::AiError;
use crate::normalize::NormalizeError;
use crate::ocr::OcrError;
use crate::schema::ApiError;

/// Bound on upstream error text echoed back in `detail`.
const DETAIL_LIMIT: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed or unsupported upload. Never retried.
    #[error("{message}")]
    InvalidInput {
        message: String,
        detail: Option<String>,
    },
    /// OCR collaborator failure. Not retried by this layer.
    #[error("OCR processing failed")]
    OcrFailed { detail: Option<String> },
    /// The AI dependency is presumed unhealthy; no call was made.
    #[error("AI service is temporarily unavailable")]
    CircuitOpen,
    /// AI dependency failure, transient retries exhausted or permanent.
    #[error("AI service error")]
    AiService { detail: Option<String> },
    /// The AI returned a successful but blank completion.
    #[error("empty response from AI service")]
    EmptyAiResponse,
    /// The AI response was not parseable JSON.
    #[error("failed to parse structured data from AI response")]
    MalformedResponse { detail: String },
    /// The AI response parsed but violated the invoice schema.
    #[error("AI response data failed validation")]
    SchemaValidationFailed { detail: String },
    /// Unexpected internal failure, reported as a safe summary.
    #[error("{message}")]
    Internal { message: String },
}

impl AppError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            detail: None,
        }
    }

    pub fn invalid_input_with_detail(
        message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::InvalidInput {
            message: message.into(),
            detail: Some(detail.into()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            AppError::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            AppError::OcrFailed { .. }
            | AppError::AiService { .. }
            | AppError::EmptyAiResponse
            | AppError::MalformedResponse { .. }
            | AppError::SchemaValidationFailed { .. }
            | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::InvalidInput { .. } => "INVALID_INPUT",
            AppError::OcrFailed { .. } => "OCR_ERROR",
            AppError::CircuitOpen => "CIRCUIT_BREAKER_OPEN",
            AppError::AiService { .. } => "AI_SERVICE_ERROR",
            AppError::EmptyAiResponse => "EMPTY_AI_RESPONSE",
            AppError::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            AppError::SchemaValidationFailed { .. } => "SCHEMA_VALIDATION_FAILED",
            AppError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn detail(&self) -> Option<String> {
        match self {
            AppError::InvalidInput { detail, .. }
            | AppError::OcrFailed { detail }
            | AppError::AiService { detail } => detail.clone(),
            AppError::CircuitOpen => Some(
                "Circuit breaker is open due to repeated failures. Please try again later."
                    .to_string(),
            ),
            AppError::MalformedResponse { detail }
            | AppError::SchemaValidationFailed { detail } => Some(detail.clone()),
            AppError::EmptyAiResponse | AppError::Internal { .. } => None,
        }
    }
}

impl From<OcrError> for AppError {
    fn from(err: OcrError) -> Self {
        AppError::OcrFailed {
            detail: Some(truncate(&err.to_string())),
        }
    }
}

impl From<AiError> for AppError {
    fn from(err: AiError) -> Self {
        AppError::AiService {
            detail: Some(truncate(&err.to_string())),
        }
    }
}

impl From<NormalizeError> for AppError {
    fn from(err: NormalizeError) -> Self {
        match err {
            NormalizeError::Malformed { detail } => AppError::MalformedResponse { detail },
            NormalizeError::SchemaValidation { detail } => {
                AppError::SchemaValidationFailed { detail }
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match status {
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_REQUEST => {
                warn!("request failed: {} ({})", self, self.error_code())
            }
            _ => error!("request failed: {} ({})", self, self.error_code()),
        }

        let body = ApiError::new(self.to_string(), self.error_code(), self.detail());
        (status, Json(body)).into_response()
    }
}

fn truncate(detail: &str) -> String {
    detail.chars().take(DETAIL_LIMIT).collect()
}
