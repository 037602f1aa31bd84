//! Runtime configuration from environment variables.
//!
//! Values come from the process environment (a `.env` file is loaded in
//! `main` if present). Everything has a default except the Gemini API key,
//! which fails fast at startup.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::breaker::{DEFAULT_COOLDOWN, DEFAULT_FAILURE_THRESHOLD};
use crate::cache::DEFAULT_TTL;
use crate::extractor::DEFAULT_MAX_FILE_SIZE;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    /// Redis connection URL; unset means the in-memory cache.
    pub redis_url: Option<String>,
    pub cache_ttl: Duration,
    pub gemini_api_key: String,
    pub gemini_model: String,
    /// OCR sidecar base URL; unset means the local text provider.
    pub ocr_sidecar_url: Option<String>,
    pub max_file_size: usize,
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown: Duration,
    pub retry: RetryPolicy,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let gemini_api_key = env::var("GEMINI_API_KEY")
            .context("GEMINI_API_KEY environment variable not set")?;

        let retry = RetryPolicy {
            max_attempts: parse_or("RETRY_MAX_ATTEMPTS", 3),
            ..RetryPolicy::default()
        };

        Ok(Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            redis_url: env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
            cache_ttl: Duration::from_secs(parse_or("CACHE_TTL_SECS", DEFAULT_TTL.as_secs())),
            gemini_api_key,
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-pro".to_string()),
            ocr_sidecar_url: env::var("OCR_SIDECAR_URL").ok().filter(|s| !s.is_empty()),
            max_file_size: parse_or("MAX_FILE_SIZE_MB", (DEFAULT_MAX_FILE_SIZE / (1024 * 1024)) as u64)
                as usize
                * 1024
                * 1024,
            breaker_failure_threshold: parse_or(
                "BREAKER_FAILURE_THRESHOLD",
                DEFAULT_FAILURE_THRESHOLD,
            ),
            breaker_cooldown: Duration::from_secs(parse_or(
                "BREAKER_COOLDOWN_SECS",
                DEFAULT_COOLDOWN.as_secs(),
            )),
            retry,
        })
    }

    pub fn max_file_size_mb(&self) -> usize {
        self.max_file_size / (1024 * 1024)
    }
}

/// Parse an env var, falling back to the default on absence or bad input.
fn parse_or<T: std::str::FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_uses_default_when_unset() {
        assert_eq!(parse_or("DEFINITELY_NOT_SET_12345", 42u32), 42);
    }

    #[test]
    fn test_parse_or_ignores_garbage() {
        env::set_var("INVOICE_EXTRACTOR_TEST_GARBAGE", "not-a-number");
        assert_eq!(parse_or("INVOICE_EXTRACTOR_TEST_GARBAGE", 7u32), 7);
        env::remove_var("INVOICE_EXTRACTOR_TEST_GARBAGE");
    }
}
