//! AI response normalization and schema validation.
//!
//! Models wrap JSON in markdown fences often enough that stripping them is
//! the first step of every parse. Parsing is two-phase, a syntax check
//! against raw JSON followed by typed deserialization into [`InvoiceData`],
//! so the caller can tell a malformed response from a schema violation.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::schema::InvoiceData;

/// How much of a diagnostic we keep. Raw AI payloads stay out of errors.
const DETAIL_LIMIT: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("failed to parse structured data from AI response")]
    Malformed { detail: String },
    #[error("AI response data failed validation")]
    SchemaValidation { detail: String },
}

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("fence pattern compiles")
    })
}

/// Strip markdown code fences and surrounding whitespace from a raw AI
/// response, returning the innermost content.
pub fn clean_ai_response(raw: &str) -> &str {
    let trimmed = raw.trim();
    match fence_pattern().captures(trimmed) {
        Some(caps) => {
            debug!("removed markdown code fences from AI response");
            caps.get(1).map(|m| m.as_str()).unwrap_or(trimmed)
        }
        None => trimmed,
    }
}

/// Parse and validate a raw AI response into an [`InvoiceData`] record.
pub fn normalize(raw: &str) -> Result<InvoiceData, NormalizeError> {
    let cleaned = clean_ai_response(raw);

    // Syntax gate first, so a parse failure reports the JSON diagnostic
    // rather than a misleading schema error.
    let value: serde_json::Value =
        serde_json::from_str(cleaned).map_err(|e| NormalizeError::Malformed {
            detail: truncate(&e.to_string()),
        })?;

    serde_json::from_value(value).map_err(|e| NormalizeError::SchemaValidation {
        detail: truncate(&e.to_string()),
    })
}

fn truncate(detail: &str) -> String {
    detail.chars().take(DETAIL_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_JSON: &str = r#"{"invoice_number":"INV-1","vendor_name":"Acme","subtotal":10,"tax":1,"total":11,"currency":"USD","items":[]}"#;

    #[test]
    fn test_fenced_json_roundtrip() {
        let raw = format!("```json\n{}\n```", VALID_JSON);
        let record = normalize(&raw).unwrap();
        assert_eq!(record.invoice_number, "INV-1");
        assert_eq!(record.total, 11.0);
    }

    #[test]
    fn test_untagged_fence() {
        let raw = format!("```\n{}\n```", VALID_JSON);
        let record = normalize(&raw).unwrap();
        assert_eq!(record.vendor_name, "Acme");
    }

    #[test]
    fn test_bare_json_with_whitespace() {
        let raw = format!("  \n{}\n  ", VALID_JSON);
        assert!(normalize(&raw).is_ok());
    }

    #[test]
    fn test_fence_with_surrounding_prose() {
        let raw = format!("Here is the data:\n```json\n{}\n```\nLet me know!", VALID_JSON);
        assert!(normalize(&raw).is_ok());
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = normalize("not json at all").unwrap_err();
        match err {
            NormalizeError::Malformed { detail } => assert!(!detail.is_empty()),
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_total_fails_validation() {
        let raw = r#"{"invoice_number":"INV-1","vendor_name":"Acme","subtotal":10,"tax":1,"total":"not-a-number","currency":"USD","items":[]}"#;
        assert!(matches!(
            normalize(raw).unwrap_err(),
            NormalizeError::SchemaValidation { .. }
        ));
    }

    #[test]
    fn test_missing_required_field_fails_validation() {
        let raw = r#"{"vendor_name":"Acme","subtotal":10,"tax":1,"total":11}"#;
        assert!(matches!(
            normalize(raw).unwrap_err(),
            NormalizeError::SchemaValidation { .. }
        ));
    }

    #[test]
    fn test_diagnostic_is_truncated() {
        let long_garbage = format!("{{\"oops\": \"{}\"", "x".repeat(1000));
        match normalize(&long_garbage).unwrap_err() {
            NormalizeError::Malformed { detail } => assert!(detail.chars().count() <= 200),
            other => panic!("expected Malformed, got {:?}", other),
        }
    }
}
