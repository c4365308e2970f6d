//! Rendering surface abstraction.
//!
//! A surface is an isolated, off-screen execution context that loads a
//! template, runs it against delivered data and can print the result to a
//! fixed-format byte artifact. Concrete hosts implement [`RenderingSurface`];
//! the pipeline only ever touches them through a [`SurfaceHandle`].

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use super::bus::{SignalBus, Subscription};
use super::token::CorrelationToken;

/// Query parameter carrying the correlation token in a template address.
pub const TOKEN_PARAM: &str = "token";

/// Errors raised by a rendering surface.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("failed to create rendering surface: {0}")]
    Create(String),
    #[error("failed to load template '{address}': {reason}")]
    Load { address: String, reason: String },
    #[error("failed to deliver data to the surface: {0}")]
    Send(String),
    #[error("rendering surface crashed: {0}")]
    Crashed(String),
    #[error("failed to capture the rendered document: {0}")]
    Capture(String),
    #[error("invalid template address: {0}")]
    Address(String),
    #[error("rendering surface has already been destroyed")]
    Destroyed,
}

/// Fixed page format used when capturing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFormat {
    pub paper: String,
    pub margin: String,
}

impl Default for PageFormat {
    fn default() -> Self {
        Self {
            paper: "a4".to_string(),
            margin: "12mm".to_string(),
        }
    }
}

/// Template load address with the correlation token appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateAddress {
    url: Url,
}

impl TemplateAddress {
    pub fn new(template: &Url, token: &CorrelationToken) -> Self {
        let mut url = template.clone();
        url.query_pairs_mut()
            .append_pair(TOKEN_PARAM, token.as_str());
        Self { url }
    }

    pub fn parse(raw: &str) -> Result<Self, SurfaceError> {
        let url = Url::parse(raw).map_err(|e| SurfaceError::Address(e.to_string()))?;
        Ok(Self { url })
    }

    /// Token carried by the address, if any.
    pub fn token(&self) -> Option<CorrelationToken> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == TOKEN_PARAM)
            .map(|(_, value)| CorrelationToken::from_raw(value.into_owned()))
    }

    /// Local file backing a `file://` address.
    pub fn template_path(&self) -> Result<PathBuf, SurfaceError> {
        if self.url.scheme() != "file" {
            return Err(SurfaceError::Address(format!(
                "unsupported scheme '{}'",
                self.url.scheme()
            )));
        }
        self.url
            .to_file_path()
            .map_err(|_| SurfaceError::Address(self.url.to_string()))
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

/// Convert a template path into a `file://` URL, resolving relative paths
/// against the working directory.
pub fn template_url(path: &Path) -> Result<Url, SurfaceError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| SurfaceError::Address(e.to_string()))?
            .join(path)
    };
    Url::from_file_path(&absolute)
        .map_err(|_| SurfaceError::Address(absolute.display().to_string()))
}

/// An off-screen rendering context.
///
/// `load` resolves when navigation completes, not when the template has
/// rendered; rendering completion arrives as a `Rendered` signal on the bus.
#[async_trait]
pub trait RenderingSurface: Send {
    async fn load(&mut self, address: &TemplateAddress) -> Result<(), SurfaceError>;

    async fn send_data(&mut self, payload: &Value) -> Result<(), SurfaceError>;

    /// Print the rendered document to fixed-format bytes.
    async fn capture(&mut self) -> Result<Vec<u8>, SurfaceError>;

    /// Release every resource held by the surface. Must tolerate repeated calls.
    fn destroy(&mut self);
}

/// Creates one surface per request. Surfaces publish their signals on `bus`.
#[async_trait]
pub trait SurfaceFactory: Send + Sync {
    async fn create(&self, bus: SignalBus) -> Result<Box<dyn RenderingSurface>, SurfaceError>;
}

/// Exclusive owner of one surface for one token.
pub struct SurfaceHandle {
    token: CorrelationToken,
    inner: Box<dyn RenderingSurface>,
    destroyed: bool,
}

impl SurfaceHandle {
    pub fn new(token: CorrelationToken, inner: Box<dyn RenderingSurface>) -> Self {
        Self {
            token,
            inner,
            destroyed: false,
        }
    }

    /// Start loading the template. Requires the listener for this token,
    /// so loading can never begin before the handshake listener exists.
    pub async fn load(
        &mut self,
        address: &TemplateAddress,
        listener: &Subscription,
    ) -> Result<(), SurfaceError> {
        self.ensure_alive()?;
        if listener.token() != &self.token {
            return Err(SurfaceError::Address(format!(
                "listener token {} does not belong to surface {}",
                listener.token(),
                self.token
            )));
        }
        if address.token().as_ref() != Some(&self.token) {
            return Err(SurfaceError::Address(format!(
                "address {} does not carry token {}",
                address.as_str(),
                self.token
            )));
        }
        self.inner.load(address).await
    }

    pub async fn send_data(&mut self, payload: &Value) -> Result<(), SurfaceError> {
        self.ensure_alive()?;
        self.inner.send_data(payload).await
    }

    pub async fn capture(&mut self) -> Result<Vec<u8>, SurfaceError> {
        self.ensure_alive()?;
        self.inner.capture().await
    }

    /// Destroy the surface. Returns `true` only for the call that actually
    /// destroyed it.
    pub fn destroy(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        self.destroyed = true;
        self.inner.destroy();
        log::debug!("rendering surface for token {} destroyed", self.token);
        true
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn token(&self) -> &CorrelationToken {
        &self.token
    }

    fn ensure_alive(&self) -> Result<(), SurfaceError> {
        if self.destroyed {
            Err(SurfaceError::Destroyed)
        } else {
            Ok(())
        }
    }
}

impl Drop for SurfaceHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}
