//! Extraction prompt assembly.
//!
//! Pure string building: the OCR text is embedded verbatim, with no
//! validation. A malformed document produces a malformed prompt and the
//! schema validation downstream catches the fallout.

const EXTRACTION_TEMPLATE_HEADER: &str = "\
You are an expert at extracting structured data from invoice text.
Please extract the following information from the given invoice text and return it in JSON format:

- invoice_number: The invoice or document number
- invoice_date: Date of the invoice (format: YYYY-MM-DD)
- due_date: Payment due date (format: YYYY-MM-DD)
- vendor_name: Name of the vendor/supplier
- vendor_address: Vendor's address
- customer_name: Customer name
- customer_address: Customer address
- subtotal: Subtotal amount (numeric)
- tax: Tax amount (numeric)
- total: Total amount (numeric)
- currency: Currency code (e.g., USD, EUR)
- items: Array of line items with description, quantity, unit_price, total_price

If any field is not found or unclear, return null for that field.
";

/// Build the invoice extraction prompt from OCR output and optional
/// pre-extracted table hints (appended as an enumerated section).
pub fn build_extraction_prompt(invoice_text: &str, table_hints: &[String]) -> String {
    let mut table_section = String::new();
    if !table_hints.is_empty() {
        table_section.push_str("\nTable Data:\n");
        for (i, table) in table_hints.iter().enumerate() {
            table_section.push_str(&format!("Table {}:\n{}\n", i + 1, table));
        }
    }

    format!(
        "{}\nInvoice Text:\n{}\n{}\nResponse (valid JSON only):\n",
        EXTRACTION_TEMPLATE_HEADER, invoice_text, table_section
    )
}
