//! Typst-backed rendering surface.
//!
//! Each surface owns a private scratch workspace. Loading copies the
//! template in and announces readiness; delivering data writes `data.json`
//! and runs the Typst compiler in the background, which announces
//! `rendered` (or `crashed`) on the signal bus when it finishes. Capture
//! hands back the compiled PDF.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::{tempdir, TempDir};
use tokio::process::Command;
use tokio::task::JoinHandle;

use super::bus::{SignalBus, SurfaceSignal};
use super::surface::{PageFormat, RenderingSurface, SurfaceError, SurfaceFactory, TemplateAddress};
use super::token::CorrelationToken;
use crate::render::surface::TOKEN_PARAM;

const TEMPLATE_FILE: &str = "template.typ";
const DATA_FILE: &str = "data.json";
const OUTPUT_FILE: &str = "output.pdf";

/// Creates [`TypstSurface`]s that share a compiler binary and page format.
#[derive(Debug, Clone)]
pub struct TypstSurfaceFactory {
    typst_bin: PathBuf,
    page: PageFormat,
}

impl TypstSurfaceFactory {
    pub fn new(typst_bin: impl Into<PathBuf>, page: PageFormat) -> Self {
        Self {
            typst_bin: typst_bin.into(),
            page,
        }
    }
}

#[async_trait]
impl SurfaceFactory for TypstSurfaceFactory {
    async fn create(&self, bus: SignalBus) -> Result<Box<dyn RenderingSurface>, SurfaceError> {
        let workspace = tempdir().map_err(|e| SurfaceError::Create(e.to_string()))?;
        log::debug!("typst surface workspace at {}", workspace.path().display());
        Ok(Box::new(TypstSurface {
            workspace: Some(workspace),
            bus,
            token: None,
            typst_bin: self.typst_bin.clone(),
            page: self.page.clone(),
            task: None,
        }))
    }
}

pub struct TypstSurface {
    workspace: Option<TempDir>,
    bus: SignalBus,
    token: Option<CorrelationToken>,
    typst_bin: PathBuf,
    page: PageFormat,
    task: Option<JoinHandle<()>>,
}

impl TypstSurface {
    fn workspace(&self) -> Result<&Path, SurfaceError> {
        self.workspace
            .as_ref()
            .map(TempDir::path)
            .ok_or(SurfaceError::Destroyed)
    }

    fn replace_task(&mut self, task: JoinHandle<()>) {
        if let Some(previous) = self.task.replace(task) {
            previous.abort();
        }
    }
}

#[async_trait]
impl RenderingSurface for TypstSurface {
    async fn load(&mut self, address: &TemplateAddress) -> Result<(), SurfaceError> {
        let workspace = self.workspace()?.to_path_buf();
        let load_error = |reason: String| SurfaceError::Load {
            address: address.as_str().to_string(),
            reason,
        };

        let token = address
            .token()
            .ok_or_else(|| load_error(format!("missing '{}' parameter", TOKEN_PARAM)))?;
        let template_path = address.template_path()?;
        let source = tokio::fs::read_to_string(&template_path)
            .await
            .map_err(|e| load_error(e.to_string()))?;
        tokio::fs::write(workspace.join(TEMPLATE_FILE), source)
            .await
            .map_err(|e| load_error(e.to_string()))?;

        self.token = Some(token.clone());

        let bus = self.bus.clone();
        self.replace_task(tokio::spawn(async move {
            bus.publish(SurfaceSignal::ready(&token));
        }));
        Ok(())
    }

    async fn send_data(&mut self, payload: &Value) -> Result<(), SurfaceError> {
        let workspace = self.workspace()?.to_path_buf();
        let token = self
            .token
            .clone()
            .ok_or_else(|| SurfaceError::Send("template not loaded".to_string()))?;

        let data =
            serde_json::to_vec_pretty(payload).map_err(|e| SurfaceError::Send(e.to_string()))?;
        tokio::fs::write(workspace.join(DATA_FILE), data)
            .await
            .map_err(|e| SurfaceError::Send(e.to_string()))?;

        let bus = self.bus.clone();
        let typst_bin = self.typst_bin.clone();
        let page = self.page.clone();
        self.replace_task(tokio::spawn(async move {
            match compile(&typst_bin, &workspace, &page).await {
                Ok(()) => bus.publish(SurfaceSignal::rendered(&token)),
                Err(reason) => bus.publish(SurfaceSignal::crashed(&token, reason)),
            };
        }));
        Ok(())
    }

    async fn capture(&mut self) -> Result<Vec<u8>, SurfaceError> {
        let output = self.workspace()?.join(OUTPUT_FILE);
        let bytes = tokio::fs::read(&output)
            .await
            .map_err(|e| SurfaceError::Capture(e.to_string()))?;
        if !bytes.starts_with(b"%PDF") {
            return Err(SurfaceError::Capture(
                "compiler output is not a PDF document".to_string(),
            ));
        }
        Ok(bytes)
    }

    fn destroy(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(workspace) = self.workspace.take() {
            let path = workspace.path().to_path_buf();
            if let Err(e) = workspace.close() {
                log::warn!(
                    "failed to remove typst workspace {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }
}

impl Drop for TypstSurface {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Compile the workspace template to `output.pdf`.
async fn compile(typst_bin: &Path, workspace: &Path, page: &PageFormat) -> Result<(), String> {
    let output = Command::new(typst_bin)
        .arg("compile")
        .arg("--root")
        .arg(workspace)
        .arg("--input")
        .arg(format!("paper={}", page.paper))
        .arg("--input")
        .arg(format!("margin={}", page.margin))
        .arg(TEMPLATE_FILE)
        .arg(OUTPUT_FILE)
        .current_dir(workspace)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("failed to run {}: {}", typst_bin.display(), e))?;

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "typst exited with status {}: {}",
            code,
            stderr.trim()
        ));
    }
    Ok(())
}
