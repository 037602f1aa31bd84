//! Invoice Extractor - OCR + AI structured extraction server.

mod ai;
mod breaker;
mod cache;
mod config;
mod error;
mod extractor;
mod failure;
mod fingerprint;
mod normalize;
mod ocr;
mod prompt;
mod retry;
mod schema;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Request, State},
    http::HeaderValue,
    middleware::{self, Next},
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ai::{AiClient, GeminiClient};
use breaker::CircuitBreaker;
use cache::{MemoryResultCache, RedisResultCache, ResultCache};
use config::Settings;
use error::AppError;
use extractor::{ExtractionPipeline, Upload};
use ocr::{local::LocalTextProvider, remote::RemoteOcrProvider, OcrProvider};
use schema::InvoiceData;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<ExtractionPipeline>,
    cache: Arc<dyn ResultCache>,
    breaker: Arc<CircuitBreaker>,
    settings: Arc<Settings>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "invoice_extractor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;

    // Result cache: redis when configured, in-memory otherwise
    let cache: Arc<dyn ResultCache> = match &settings.redis_url {
        Some(url) => {
            info!("using redis result cache at {}", url);
            Arc::new(RedisResultCache::new(url.clone(), settings.cache_ttl))
        }
        None => {
            info!("REDIS_URL not set - using in-memory result cache");
            Arc::new(MemoryResultCache::new(settings.cache_ttl))
        }
    };

    // OCR provider: sidecar when configured, local text layer otherwise
    let ocr: Arc<dyn OcrProvider> = match &settings.ocr_sidecar_url {
        Some(url) => {
            info!("using OCR sidecar at {}", url);
            Arc::new(RemoteOcrProvider::new(url.clone(), reqwest::Client::new()))
        }
        None => {
            info!("OCR_SIDECAR_URL not set - using local text extraction");
            Arc::new(LocalTextProvider)
        }
    };

    let ai: Arc<dyn AiClient> = Arc::new(
        GeminiClient::new(settings.gemini_api_key.clone())
            .with_model(settings.gemini_model.clone()),
    );
    info!("Gemini client initialized: model={}", settings.gemini_model);

    // One breaker per AI backend, shared by all requests
    let breaker = Arc::new(CircuitBreaker::new(
        settings.breaker_failure_threshold,
        settings.breaker_cooldown,
    ));

    let pipeline = Arc::new(ExtractionPipeline::new(
        ocr,
        ai,
        cache.clone(),
        breaker.clone(),
        settings.retry,
        settings.max_file_size,
    ));

    let state = AppState {
        pipeline,
        cache,
        breaker,
        settings: Arc::new(settings.clone()),
    };

    // Build router
    let app = Router::new()
        .route("/health", get(health))
        .route("/health/detailed", get(health_detailed))
        .route("/extract", post(extract_invoice))
        .route("/extract-base64", post(extract_invoice_base64))
        .layer(DefaultBodyLimit::max(settings.max_file_size + 1024 * 1024))
        .layer(middleware::from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Run server
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!("Server listening on http://{}", settings.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Tag every request with a UUID, surfaced in logs and the response.
async fn request_id(req: Request, next: Next) -> Response {
    let id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("request", request_id = %id);
    let mut response = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

// ============================================================================
// Handlers
// ============================================================================

/// Service health check endpoint.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Detailed health check: backing services and breaker state.
async fn health_detailed(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cache_status = if state.cache.ping().await {
        "ok"
    } else {
        "degraded"
    };

    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "services": {
            "cache": cache_status,
            "ai_service": "ok",
            "ocr": state.pipeline.ocr_provider_name(),
        },
        "circuit_breaker": {
            "state": state.breaker.state().as_str(),
            "failure_count": state.breaker.failure_count(),
        },
        "supported_file_types": ["application/pdf", "image/png", "image/jpeg"],
        "max_file_size_mb": state.settings.max_file_size_mb(),
    }))
}

/// Extract structured data from an uploaded invoice file (PDF, PNG, JPG).
async fn extract_invoice(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<InvoiceData>, AppError> {
    let mut filename = String::from("invoice");
    let mut content_type = None;
    let mut file_data = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::invalid_input_with_detail("Multipart error", e.to_string())
    })? {
        if field.name() == Some("file") {
            filename = field.file_name().unwrap_or("invoice").to_string();
            content_type = field.content_type().map(|ct| ct.to_string());
            file_data = field
                .bytes()
                .await
                .map_err(|e| {
                    AppError::invalid_input_with_detail("Failed to read file", e.to_string())
                })?
                .to_vec();
            break;
        }
    }

    let record = state
        .pipeline
        .extract(Upload {
            filename,
            content_type,
            bytes: file_data,
        })
        .await?;

    Ok(Json(record))
}

#[derive(serde::Deserialize)]
struct Base64Request {
    /// Base64 file data, with or without a `data:` URL prefix.
    data: String,
    filename: Option<String>,
    mimetype: Option<String>,
}

/// Extract structured data from a JSON body carrying base64 file data.
async fn extract_invoice_base64(
    State(state): State<AppState>,
    Json(request): Json<Base64Request>,
) -> Result<Json<InvoiceData>, AppError> {
    let bytes = decode_base64_payload(&request.data)?;

    let record = state
        .pipeline
        .extract(Upload {
            filename: request.filename.unwrap_or_else(|| "invoice.pdf".to_string()),
            content_type: request.mimetype,
            bytes,
        })
        .await?;

    Ok(Json(record))
}

/// Decode a base64 payload, stripping a data URL prefix
/// (e.g. "data:application/pdf;base64,") if present.
fn decode_base64_payload(data: &str) -> Result<Vec<u8>, AppError> {
    let encoded = if data.starts_with("data:") {
        data.split_once(',').map(|(_, rest)| rest).unwrap_or(data)
    } else {
        data
    };

    BASE64
        .decode(encoded.trim())
        .map_err(|e| AppError::invalid_input_with_detail("Invalid base64 data", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_base64() {
        let encoded = BASE64.encode(b"%PDF-1.4 test");
        assert_eq!(decode_base64_payload(&encoded).unwrap(), b"%PDF-1.4 test");
    }

    #[test]
    fn test_decode_data_url_prefix() {
        let encoded = format!(
            "data:application/pdf;base64,{}",
            BASE64.encode(b"%PDF-1.4 test")
        );
        assert_eq!(decode_base64_payload(&encoded).unwrap(), b"%PDF-1.4 test");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_base64_payload("!!!not base64!!!").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }
}
