//! Request validation.
//!
//! Runs before any rendering surface is created; a request that fails here
//! never reaches the handshake.

use std::fmt;

use super::model::{InvoicePayload, RenderRequest};

/// One rejected field.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// The field that failed validation
    pub field: String,
    pub message: String,
    /// Suggestion for how to fix the error
    pub suggestion: Option<String>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn empty_field(field: &str, label: &str) -> Self {
        Self::new(field, format!("{} must not be empty", label))
    }

    pub fn no_line_items(field: &str) -> Self {
        Self::new(field, "invoice has no line items")
            .with_suggestion("Add at least one payment before generating the document")
    }

    pub fn negative_amount(field: &str, value: f64) -> Self {
        Self::new(field, format!("amount {} is negative", value))
    }

    pub fn not_a_number(field: &str) -> Self {
        Self::new(field, "amount is not a finite number")
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, ". {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// All problems found in one request.
#[derive(Debug, Default, Clone)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

pub fn validate_required(value: &str, field: &str, label: &str, errors: &mut ValidationErrors) {
    if value.trim().is_empty() {
        errors.add(ValidationError::empty_field(field, label));
    }
}

pub fn validate_amount(value: f64, field: &str, errors: &mut ValidationErrors) {
    if !value.is_finite() {
        errors.add(ValidationError::not_a_number(field));
    } else if value < 0.0 {
        errors.add(ValidationError::negative_amount(field, value));
    }
}

pub fn validate_payload(payload: &InvoicePayload, errors: &mut ValidationErrors) {
    validate_required(
        &payload.customer_name,
        "payload.customer_name",
        "Customer name",
        errors,
    );
    validate_required(
        &payload.reference_number,
        "payload.reference_number",
        "Reference number",
        errors,
    );

    if payload.line_items.is_empty() {
        errors.add(ValidationError::no_line_items("payload.line_items"));
    }

    for (i, item) in payload.line_items.iter().enumerate() {
        validate_required(
            &item.description,
            &format!("payload.line_items[{i}].description"),
            "Description",
            errors,
        );
        validate_amount(
            item.amount_paid,
            &format!("payload.line_items[{i}].amount_paid"),
            errors,
        );
        validate_amount(
            item.remaining_balance,
            &format!("payload.line_items[{i}].remaining_balance"),
            errors,
        );
    }

    validate_amount(payload.total_paid, "payload.total_paid", errors);
}

/// Reject requests with no renderable content.
pub fn validate_request(request: &RenderRequest) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    validate_payload(&request.payload, &mut errors);
    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::model::{LineItem, RenderMode};

    fn payload() -> InvoicePayload {
        InvoicePayload {
            customer_name: "Asha Verma".to_string(),
            reference_number: "ADM-031".to_string(),
            date: String::new(),
            line_items: vec![LineItem {
                description: "Learning License".to_string(),
                date: "12 Mar 2024".to_string(),
                mode: "Cash".to_string(),
                amount_paid: 500.0,
                remaining_balance: 0.0,
            }],
            total_paid: 500.0,
            document_type: "Invoice".to_string(),
        }
    }

    #[test]
    fn test_valid_request_passes() {
        let request = RenderRequest {
            payload: payload(),
            mode: RenderMode::Print,
            destination: None,
        };
        assert!(validate_request(&request).is_ok());
    }

    #[test]
    fn test_empty_line_items_rejected() {
        let mut p = payload();
        p.line_items.clear();
        let err = validate_request(&RenderRequest::print(p)).unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err.errors()[0].field, "payload.line_items");
    }

    #[test]
    fn test_collects_every_problem() {
        let mut p = payload();
        p.customer_name = "  ".to_string();
        p.line_items[0].description.clear();
        p.line_items[0].amount_paid = -1.0;
        p.total_paid = f64::NAN;
        let err = validate_request(&RenderRequest::print(p)).unwrap_err();
        assert_eq!(err.len(), 4);
        assert!(err.to_string().contains("payload.customer_name"));
    }
}
