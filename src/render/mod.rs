//! Document rendering and capture pipeline.
//!
//! Turns an invoice payload into a PDF by driving an off-screen rendering
//! surface through the ready → data → rendered handshake, then either saves
//! the artifact to a chosen path or hands it to a visible preview surface.
//!
//! - `token` - correlation tokens
//! - `bus` - token-filtered signal delivery
//! - `surface` - surface abstraction and handle
//! - `handshake` - handshake state machine and driver
//! - `cleanup` - scoped release of listener and surface
//! - `capture` - save / preview strategies
//! - `pipeline` - the public `render_document` operation
//! - `typst` - Typst-backed surface

pub mod bus;
pub mod capture;
pub mod cleanup;
pub mod handshake;
pub mod pipeline;
pub mod surface;
pub mod token;
pub mod typst;

pub use bus::{SignalBus, SignalKind, Subscription, SurfaceSignal};
pub use capture::{
    CaptureStrategy, CapturedArtifact, DestinationPrompt, OutputDirectoryPrompt, PreviewAndDelete,
    SaveToPath,
};
pub use cleanup::CleanupGuard;
pub use handshake::{HandshakeCoordinator, HandshakeState, HandshakeTimeouts, WaitStage};
pub use pipeline::{PipelineOptions, RenderPipeline};
pub use surface::{
    PageFormat, RenderingSurface, SurfaceError, SurfaceFactory, SurfaceHandle, TemplateAddress,
};
pub use token::CorrelationToken;
pub use typst::{TypstSurface, TypstSurfaceFactory};

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

use crate::invoice::model::RenderMode;
use crate::invoice::validation::ValidationErrors;
use crate::preview::PreviewError;
use handshake::IllegalTransition;

/// Failures that end a render with no document.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid render request: {0}")]
    InvalidRequest(#[from] ValidationErrors),
    #[error("timed out after {bound:?} waiting for the {stage}")]
    HandshakeTimeout { stage: WaitStage, bound: Duration },
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error("failed to write document to {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Preview(#[from] PreviewError),
    #[error(transparent)]
    Handshake(#[from] IllegalTransition),
}

impl RenderError {
    /// Stable machine code reported to callers.
    pub fn code(&self) -> &'static str {
        match self {
            RenderError::InvalidRequest(_) => "invalid_request",
            RenderError::HandshakeTimeout { .. } => "timeout",
            RenderError::Surface(_) => "surface",
            RenderError::Persistence { .. } => "persistence",
            RenderError::Preview(_) => "preview",
            RenderError::Handshake(_) => "internal",
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RenderError::Persistence {
            path: path.into(),
            source,
        }
    }
}

/// Non-error terminal outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// SAVE: artifact written to `path`.
    Saved { path: PathBuf },
    /// SAVE: the user declined to choose a destination.
    Cancelled,
    /// PRINT: artifact is displayed in a preview surface.
    Previewing { preview_url: Option<String> },
}

/// Structured result of `render_document`.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct RenderResult {
    pub succeeded: bool,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RenderResult {
    pub fn from_outcome(token: &CorrelationToken, outcome: RenderOutcome) -> Self {
        let base = Self {
            succeeded: false,
            token: token.to_string(),
            path: None,
            preview_url: None,
            error: None,
            message: None,
        };
        match outcome {
            RenderOutcome::Saved { path } => Self {
                succeeded: true,
                path: Some(path.display().to_string()),
                ..base
            },
            RenderOutcome::Cancelled => Self {
                message: Some("no document produced: save cancelled".to_string()),
                ..base
            },
            RenderOutcome::Previewing { preview_url } => Self {
                succeeded: true,
                preview_url,
                ..base
            },
        }
    }

    pub fn from_error(token: &CorrelationToken, mode: RenderMode, error: &RenderError) -> Self {
        let message = match mode {
            RenderMode::Save => format!("no document produced: {error}"),
            RenderMode::Print => format!("could not prepare the preview: {error}"),
        };
        Self {
            succeeded: false,
            token: token.to_string(),
            path: None,
            preview_url: None,
            error: Some(error.code().to_string()),
            message: Some(message),
        }
    }
}
