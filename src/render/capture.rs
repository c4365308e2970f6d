//! What happens to a captured artifact.
//!
//! Capture itself is one step of the handshake; the two consumers of its
//! output are strategies: [`SaveToPath`] for SAVE and [`PreviewAndDelete`]
//! for PRINT.

use async_trait::async_trait;
use chrono::Local;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::cleanup::CleanupGuard;
use super::token::CorrelationToken;
use super::{RenderError, RenderOutcome};
use crate::invoice::common::{self, ensure_pdf_extension};
use crate::invoice::model::RenderRequest;
use crate::metrics;
use crate::preview::{PreviewHost, PreviewWindow};

/// Bytes printed from a rendered surface.
#[derive(Debug, Clone)]
pub struct CapturedArtifact {
    pub token: CorrelationToken,
    pub bytes: Vec<u8>,
    pub suggested_name: String,
}

/// Asks where a SAVE artifact should go. `None` means the user declined.
#[async_trait]
pub trait DestinationPrompt: Send + Sync {
    async fn choose_destination(
        &self,
        request: &RenderRequest,
        suggested_name: &str,
    ) -> Option<PathBuf>;
}

/// Resolves the file name the caller picked into the output directory.
pub struct OutputDirectoryPrompt {
    dir: PathBuf,
}

impl OutputDirectoryPrompt {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl DestinationPrompt for OutputDirectoryPrompt {
    async fn choose_destination(
        &self,
        request: &RenderRequest,
        suggested_name: &str,
    ) -> Option<PathBuf> {
        let chosen = request.destination.as_deref()?.trim();
        // Names that sanitize to nothing (`..`, `/`) fall back like blanks.
        let file_name = match sanitize_filename::sanitize(chosen) {
            name if name.trim().is_empty() => suggested_name.to_string(),
            name => name,
        };
        Some(ensure_pdf_extension(&self.dir.join(file_name)))
    }
}

/// Consumer of a captured artifact.
#[async_trait]
pub trait CaptureStrategy: Send + Sync {
    async fn persist(
        &self,
        artifact: CapturedArtifact,
        request: &RenderRequest,
        guard: &mut CleanupGuard,
    ) -> Result<RenderOutcome, RenderError>;
}

/// SAVE: prompt for a destination and write the bytes there.
pub struct SaveToPath {
    prompt: Arc<dyn DestinationPrompt>,
}

impl SaveToPath {
    pub fn new(prompt: Arc<dyn DestinationPrompt>) -> Self {
        Self { prompt }
    }
}

#[async_trait]
impl CaptureStrategy for SaveToPath {
    async fn persist(
        &self,
        artifact: CapturedArtifact,
        request: &RenderRequest,
        _guard: &mut CleanupGuard,
    ) -> Result<RenderOutcome, RenderError> {
        let Some(path) = self
            .prompt
            .choose_destination(request, &artifact.suggested_name)
            .await
        else {
            log::info!("[token={}] save destination declined", artifact.token);
            return Ok(RenderOutcome::Cancelled);
        };

        let CapturedArtifact { token, bytes, .. } = artifact;
        let size = bytes.len();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_document(&target, &bytes))
            .await
            .map_err(|e| RenderError::persistence(&path, std::io::Error::other(e)))??;

        log::info!(
            "[token={}] saved {} bytes to {}",
            token,
            size,
            path.display()
        );
        Ok(RenderOutcome::Saved { path })
    }
}

/// PRINT: release the off-screen surface, spill the bytes to a temp file,
/// show it in a preview and delete the file once the preview closes.
pub struct PreviewAndDelete {
    scratch_dir: PathBuf,
    host: Arc<dyn PreviewHost>,
}

impl PreviewAndDelete {
    pub fn new(scratch_dir: impl Into<PathBuf>, host: Arc<dyn PreviewHost>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            host,
        }
    }
}

#[async_trait]
impl CaptureStrategy for PreviewAndDelete {
    async fn persist(
        &self,
        artifact: CapturedArtifact,
        _request: &RenderRequest,
        guard: &mut CleanupGuard,
    ) -> Result<RenderOutcome, RenderError> {
        guard.release_surface();

        let token = artifact.token.clone();
        let dir = self.scratch_dir.clone();
        let path = tokio::task::spawn_blocking(move || write_temp_artifact(&dir, &artifact))
            .await
            .map_err(|e| RenderError::persistence(&self.scratch_dir, std::io::Error::other(e)))??;

        match self.host.open(&path, &token).await {
            Ok(window) => {
                let preview_url = window.url().map(str::to_string);
                schedule_deletion(window, path, token);
                Ok(RenderOutcome::Previewing { preview_url })
            }
            Err(e) => {
                delete_temp_artifact(&path, &token).await;
                Err(e.into())
            }
        }
    }
}

/// Write `bytes` to `path` through a sibling temp file renamed into place,
/// so a failed write never leaves a truncated document behind.
pub fn write_document(path: &Path, bytes: &[u8]) -> Result<(), RenderError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| RenderError::persistence(dir, e))?;

    let mut file = tempfile::Builder::new()
        .prefix(".")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| RenderError::persistence(dir, e))?;
    file.write_all(bytes)
        .and_then(|_| file.as_file().sync_all())
        .map_err(|e| RenderError::persistence(path, e))?;
    file.persist(path)
        .map_err(|e| RenderError::persistence(path, e.error))?;
    Ok(())
}

/// Write the artifact under `dir` (created if absent) with a
/// timestamp-suffixed, collision-resistant name. The file is kept on disk.
pub fn write_temp_artifact(dir: &Path, artifact: &CapturedArtifact) -> Result<PathBuf, RenderError> {
    std::fs::create_dir_all(dir).map_err(|e| RenderError::persistence(dir, e))?;

    let stem = artifact
        .suggested_name
        .trim_end_matches(".pdf")
        .to_string();
    let prefix = format!(
        "{}-{}-",
        common::sanitize_filename(&stem, "preview"),
        Local::now().format("%Y%m%d%H%M%S")
    );

    let mut file = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".pdf")
        .tempfile_in(dir)
        .map_err(|e| RenderError::persistence(dir, e))?;
    file.write_all(&artifact.bytes)
        .map_err(|e| RenderError::persistence(file.path(), e))?;

    let (_, path) = file
        .keep()
        .map_err(|e| RenderError::persistence(dir, e.error))?;
    log::debug!(
        "[token={}] preview artifact written to {}",
        artifact.token,
        path.display()
    );
    Ok(path)
}

/// Delete `path` once `window` closes. Exactly one attempt is made.
pub fn schedule_deletion(
    window: PreviewWindow,
    path: PathBuf,
    token: CorrelationToken,
) -> JoinHandle<bool> {
    tokio::spawn(async move {
        window.closed().await;
        delete_temp_artifact(&path, &token).await
    })
}

/// Best-effort removal of a preview artifact. Failures are logged only.
pub async fn delete_temp_artifact(path: &Path, token: &CorrelationToken) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            log::info!("[token={}] removed preview artifact {}", token, path.display());
            metrics::record_preview_cleanup(true);
            true
        }
        Err(e) => {
            log::warn!(
                "[token={}] failed to remove preview artifact {}: {}",
                token,
                path.display(),
                e
            );
            metrics::record_preview_cleanup(false);
            false
        }
    }
}
