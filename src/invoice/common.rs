//! Filename and date helpers shared by the save and preview flows.

use chrono::Local;
use std::path::{Path, PathBuf};

use super::model::InvoicePayload;

/// Today's date as printed on invoices (e.g. "19 Oct 2026").
pub fn format_invoice_date() -> String {
    Local::now().format("%d %b %Y").to_string()
}

/// Sanitize a string for use in filenames.
pub fn sanitize_filename(name: &str, fallback: &str) -> String {
    let mut result = String::new();
    let mut last_dash = false;

    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            result.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if (ch.is_whitespace() || ch == '-' || ch == '_' || ch == '/')
            && !last_dash
            && !result.is_empty()
        {
            result.push('-');
            last_dash = true;
        }
    }

    let result = result.trim_matches('-').to_string();
    if result.is_empty() {
        return fallback.to_string();
    }
    result
}

/// `{document-type}-{customer}-{reference}.pdf`
pub fn suggested_file_name(payload: &InvoicePayload) -> String {
    format!(
        "{}-{}-{}.pdf",
        sanitize_filename(&payload.document_type, "invoice"),
        sanitize_filename(&payload.customer_name, "customer"),
        sanitize_filename(&payload.reference_number, "ref"),
    )
}

/// Append `.pdf` unless the name already ends with it.
pub fn ensure_pdf_extension(path: &Path) -> PathBuf {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_owned();
        name.push(".pdf");
        PathBuf::from(name)
    }
}

/// Get the static assets directory path.
pub fn get_static_dir() -> &'static Path {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/static"))
}
