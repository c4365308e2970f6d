//! Invoice payloads accepted by the render pipeline.
//!
//! - `model` - request and payload types
//! - `validation` - rejects requests with nothing renderable
//! - `common` - filename and date helpers
//! - `handlers` - HTTP entry point

pub mod common;
pub mod handlers;
pub mod model;
pub mod validation;

pub use model::{InvoicePayload, LineItem, RenderMode, RenderRequest};
pub use validation::{ValidationError, ValidationErrors};
