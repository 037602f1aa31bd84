//! Invoice record and API wire types.
//!
//! `InvoiceData` is the schema the AI response must validate against:
//! required fields missing or non-numeric amounts are rejected at
//! deserialization time, never coerced.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Individual line item from an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub total_price: f64,
}

/// Structured invoice record extracted from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceData {
    pub invoice_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub vendor_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_address: Option<String>,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub items: Vec<LineItem>,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Standard error response body.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ApiError {
    pub fn new(error: impl Into<String>, error_code: &str, detail: Option<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            error_code: Some(error_code.to_string()),
            detail,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_defaults_to_usd() {
        let json = r#"{"invoice_number":"INV-1","vendor_name":"Acme","subtotal":10,"tax":1,"total":11}"#;
        let data: InvoiceData = serde_json::from_str(json).unwrap();
        assert_eq!(data.currency, "USD");
        assert!(data.items.is_empty());
    }

    #[test]
    fn test_dates_parse_iso_format() {
        let json = r#"{"invoice_number":"INV-2","invoice_date":"2024-03-15","due_date":null,
                       "vendor_name":"Acme","subtotal":10,"tax":1,"total":11,"currency":"EUR","items":[]}"#;
        let data: InvoiceData = serde_json::from_str(json).unwrap();
        assert_eq!(data.invoice_date, NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(data.due_date, None);
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let json = r#"{"vendor_name":"Acme","subtotal":10,"tax":1,"total":11}"#;
        assert!(serde_json::from_str::<InvoiceData>(json).is_err());
    }

    #[test]
    fn test_non_numeric_total_is_rejected() {
        let json = r#"{"invoice_number":"INV-3","vendor_name":"Acme","subtotal":10,"tax":1,"total":"eleven"}"#;
        assert!(serde_json::from_str::<InvoiceData>(json).is_err());
    }

    #[test]
    fn test_line_items_roundtrip() {
        let json = r#"{"invoice_number":"INV-4","vendor_name":"Acme","subtotal":20,"tax":2,"total":22,
                       "items":[{"description":"Widget","quantity":2,"unit_price":10,"total_price":20}]}"#;
        let data: InvoiceData = serde_json::from_str(json).unwrap();
        assert_eq!(data.items.len(), 1);
        assert_eq!(data.items[0].description, "Widget");
        assert_eq!(data.items[0].total_price, 20.0);
    }
}
