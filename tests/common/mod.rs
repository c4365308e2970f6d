#![allow(dead_code)]

use async_trait::async_trait;
use invoice_render_server::invoice::model::{InvoicePayload, LineItem, RenderRequest};
use invoice_render_server::preview::{PreviewCloser, PreviewError, PreviewHost, PreviewWindow};
use invoice_render_server::render::pipeline::PipelineOptions;
use invoice_render_server::render::{
    CorrelationToken, DestinationPrompt, HandshakeTimeouts, RenderPipeline, RenderingSurface,
    SignalBus, SurfaceError, SurfaceFactory, SurfaceSignal, TemplateAddress,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

/// How a scripted surface answers the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Ready after load, rendered after data.
    Normal,
    /// Publishes ready from inside `load`, before it returns.
    ReadyDuringLoad,
    /// Publishes rendered ahead of ready, before any data arrives.
    RenderedEarly,
    /// Never announces ready.
    StallReady,
    /// Ready, but never rendered.
    StallRender,
    /// Ready, then crashes once data arrives.
    Crash,
    /// Announces ready and rendered for some other token only.
    WrongToken,
    /// `load` never returns.
    HangLoad,
    /// `capture` never returns.
    HangCapture,
    /// `load` reports a navigation error.
    LoadFails,
    /// Handshake completes but printing fails.
    CaptureFails,
}

#[derive(Default)]
pub struct SurfaceStats {
    pub created: AtomicUsize,
    pub loads: AtomicUsize,
    pub destroyed: AtomicUsize,
    /// Whether a listener existed for the token at each load call.
    pub listening_at_load: Mutex<Vec<bool>>,
}

impl SurfaceStats {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

pub struct ScriptedFactory {
    script: Script,
    delay: Duration,
    pub stats: Arc<SurfaceStats>,
}

impl ScriptedFactory {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            delay: Duration::from_millis(10),
            stats: Arc::new(SurfaceStats::default()),
        }
    }
}

#[async_trait]
impl SurfaceFactory for ScriptedFactory {
    async fn create(&self, bus: SignalBus) -> Result<Box<dyn RenderingSurface>, SurfaceError> {
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSurface {
            script: self.script,
            delay: self.delay,
            bus,
            token: None,
            payload: None,
            stats: self.stats.clone(),
        }))
    }
}

pub struct ScriptedSurface {
    script: Script,
    delay: Duration,
    bus: SignalBus,
    token: Option<CorrelationToken>,
    payload: Option<Value>,
    stats: Arc<SurfaceStats>,
}

impl ScriptedSurface {
    fn publish_later(&self, signal: SurfaceSignal) {
        let bus = self.bus.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            bus.publish(signal);
        });
    }
}

#[async_trait]
impl RenderingSurface for ScriptedSurface {
    async fn load(&mut self, address: &TemplateAddress) -> Result<(), SurfaceError> {
        self.stats.loads.fetch_add(1, Ordering::SeqCst);
        let token = address
            .token()
            .ok_or_else(|| SurfaceError::Address(address.as_str().to_string()))?;
        self.stats
            .listening_at_load
            .lock()
            .push(self.bus.is_listening(&token));

        match self.script {
            Script::HangLoad => std::future::pending::<()>().await,
            Script::LoadFails => {
                return Err(SurfaceError::Load {
                    address: address.as_str().to_string(),
                    reason: "template not found".to_string(),
                })
            }
            Script::ReadyDuringLoad => {
                self.bus.publish(SurfaceSignal::ready(&token));
            }
            Script::RenderedEarly => {
                self.bus.publish(SurfaceSignal::rendered(&token));
                self.bus.publish(SurfaceSignal::ready(&token));
            }
            Script::StallReady => {}
            Script::WrongToken => {
                let stranger = CorrelationToken::from_raw("someone-else");
                self.publish_later(SurfaceSignal::ready(&stranger));
            }
            _ => self.publish_later(SurfaceSignal::ready(&token)),
        }
        self.token = Some(token);
        Ok(())
    }

    async fn send_data(&mut self, payload: &Value) -> Result<(), SurfaceError> {
        let token = self
            .token
            .clone()
            .ok_or_else(|| SurfaceError::Send("not loaded".to_string()))?;
        self.payload = Some(payload.clone());
        match self.script {
            Script::Normal
            | Script::ReadyDuringLoad
            | Script::HangCapture
            | Script::CaptureFails => self.publish_later(SurfaceSignal::rendered(&token)),
            Script::Crash => self.publish_later(SurfaceSignal::crashed(&token, "renderer exited")),
            _ => {}
        }
        Ok(())
    }

    async fn capture(&mut self) -> Result<Vec<u8>, SurfaceError> {
        match self.script {
            Script::HangCapture => std::future::pending::<()>().await,
            Script::CaptureFails => {
                return Err(SurfaceError::Capture("printer rejected the page".to_string()))
            }
            _ => {}
        }
        let customer = self
            .payload
            .as_ref()
            .and_then(|p| p["customer_name"].as_str())
            .unwrap_or("<no data>")
            .to_string();
        Ok(format!("%PDF-1.7\n% {}\n", customer).into_bytes())
    }

    fn destroy(&mut self) {
        self.stats.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Always answers with the same destination.
pub struct FixedPrompt {
    destination: Option<PathBuf>,
    pub asked: AtomicUsize,
}

impl FixedPrompt {
    pub fn new(destination: Option<PathBuf>) -> Self {
        Self {
            destination,
            asked: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DestinationPrompt for FixedPrompt {
    async fn choose_destination(
        &self,
        _request: &RenderRequest,
        _suggested_name: &str,
    ) -> Option<PathBuf> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.destination.clone()
    }
}

/// Keeps every opened preview so tests can close it.
#[derive(Default)]
pub struct RecordingPreviewHost {
    pub opened: Mutex<Vec<(PathBuf, PreviewCloser)>>,
}

impl RecordingPreviewHost {
    pub fn last(&self) -> Option<(PathBuf, PreviewCloser)> {
        self.opened.lock().last().cloned()
    }
}

#[async_trait]
impl PreviewHost for RecordingPreviewHost {
    async fn open(
        &self,
        artifact: &Path,
        _token: &CorrelationToken,
    ) -> Result<PreviewWindow, PreviewError> {
        let mut opened = self.opened.lock();
        let (window, closer) =
            PreviewWindow::new(Some(format!("memory://preview/{}", opened.len())));
        opened.push((artifact.to_path_buf(), closer));
        Ok(window)
    }
}

pub fn timeouts(ms: u64) -> HandshakeTimeouts {
    HandshakeTimeouts {
        ready: Duration::from_millis(ms),
        rendered: Duration::from_millis(ms),
    }
}

pub fn template_url(dir: &Path) -> Url {
    let template = dir.join("invoice.typ");
    std::fs::write(&template, "= Invoice").unwrap();
    Url::from_file_path(template).unwrap()
}

pub struct Harness {
    pub pipeline: RenderPipeline,
    pub stats: Arc<SurfaceStats>,
    pub prompt: Arc<FixedPrompt>,
    pub previews: Arc<RecordingPreviewHost>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new(script: Script, destination: Option<&str>) -> Self {
        Self::with_timeouts(script, destination, timeouts(500))
    }

    pub fn with_timeouts(
        script: Script,
        destination: Option<&str>,
        timeouts: HandshakeTimeouts,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let factory = ScriptedFactory::new(script);
        let stats = factory.stats.clone();
        let prompt = Arc::new(FixedPrompt::new(destination.map(|d| dir.path().join(d))));
        let previews = Arc::new(RecordingPreviewHost::default());

        let pipeline = RenderPipeline::new(
            SignalBus::new(),
            Arc::new(factory),
            prompt.clone(),
            previews.clone(),
            PipelineOptions {
                template: template_url(dir.path()),
                timeouts,
                scratch_dir: dir.path().join("scratch"),
            },
        );

        Self {
            pipeline,
            stats,
            prompt,
            previews,
            dir,
        }
    }

    pub fn scratch_files(&self) -> usize {
        std::fs::read_dir(self.dir.path().join("scratch"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

pub fn sample_payload(customer: &str) -> InvoicePayload {
    InvoicePayload {
        customer_name: customer.to_string(),
        reference_number: "ADM-2024-031".to_string(),
        date: "12 Mar 2024".to_string(),
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

/// Poll until `path` disappears or `within` elapses.
pub async fn wait_until_gone(path: &Path, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if !path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    !path.exists()
}
