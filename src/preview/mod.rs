//! Visible preview surfaces for the PRINT flow.
//!
//! A [`PreviewHost`] displays a captured artifact and reports, through the
//! returned [`PreviewWindow`], when the user closed it. The pipeline deletes
//! the backing temporary file on that close notification.

pub mod handlers;
pub mod registry;

pub use registry::PreviewRegistry;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::render::CorrelationToken;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("preview surface unavailable: {0}")]
    Unavailable(String),
    #[error("preview artifact missing: {0}")]
    MissingArtifact(String),
}

/// Something that can show a PDF to the user.
#[async_trait]
pub trait PreviewHost: Send + Sync {
    async fn open(
        &self,
        artifact: &Path,
        token: &CorrelationToken,
    ) -> Result<PreviewWindow, PreviewError>;
}

/// An open preview. Resolves [`PreviewWindow::closed`] once the user closes it.
pub struct PreviewWindow {
    url: Option<String>,
    closed: oneshot::Receiver<()>,
}

impl PreviewWindow {
    /// A new window and the handle its host uses to close it.
    pub fn new(url: Option<String>) -> (Self, PreviewCloser) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                url,
                closed: receiver,
            },
            PreviewCloser {
                sender: Arc::new(Mutex::new(Some(sender))),
            },
        )
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Wait for the close event. A host that goes away without closing
    /// counts as closed.
    pub async fn closed(self) {
        let _ = self.closed.await;
    }
}

/// Fires a window's close event at most once.
#[derive(Clone)]
pub struct PreviewCloser {
    sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl PreviewCloser {
    /// Returns `true` for the call that delivered the close event.
    pub fn close(&self) -> bool {
        match self.sender.lock().take() {
            Some(sender) => {
                let _ = sender.send(());
                true
            }
            None => false,
        }
    }
}
