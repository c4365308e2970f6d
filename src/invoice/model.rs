use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// What to do with the captured document.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RenderMode {
    /// Ask for a destination and write the PDF there.
    Save,
    /// Show the PDF in a preview surface for manual printing.
    Print,
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderMode::Save => f.write_str("SAVE"),
            RenderMode::Print => f.write_str("PRINT"),
        }
    }
}

/// One payment row on the invoice.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct LineItem {
    pub description: String,
    #[serde(default)]
    pub date: String,
    /// Payment mode, e.g. "Cash" or "UPI".
    #[serde(default)]
    pub mode: String,
    pub amount_paid: f64,
    /// Balance still owed after this payment.
    #[serde(default)]
    pub remaining_balance: f64,
}

fn default_document_type() -> String {
    "Invoice".to_string()
}

/// Fully assembled invoice data handed to the template.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct InvoicePayload {
    pub customer_name: String,
    /// Admission / reference number.
    pub reference_number: String,
    /// Pre-formatted document date; today's date when empty.
    #[serde(default)]
    pub date: String,
    pub line_items: Vec<LineItem>,
    pub total_paid: f64,
    #[serde(default = "default_document_type")]
    pub document_type: String,
}

/// Input to `render_document`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct RenderRequest {
    pub payload: InvoicePayload,
    pub mode: RenderMode,
    /// File name chosen for SAVE mode. `None` means the user declined.
    #[serde(default)]
    pub destination: Option<String>,
}

impl RenderRequest {
    pub fn save(payload: InvoicePayload, destination: Option<String>) -> Self {
        Self {
            payload,
            mode: RenderMode::Save,
            destination,
        }
    }

    pub fn print(payload: InvoicePayload) -> Self {
        Self {
            payload,
            mode: RenderMode::Print,
            destination: None,
        }
    }
}
