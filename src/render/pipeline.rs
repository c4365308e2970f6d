//! `render_document`: the public entry point of the render pipeline.
//!
//! Flow per request: issue token → attach listener → create surface →
//! handshake (load, ready, data, rendered, capture) → save or preview →
//! cleanup. Every failure is turned into a structured [`RenderResult`].

use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

use super::bus::SignalBus;
use super::capture::{
    CaptureStrategy, CapturedArtifact, DestinationPrompt, OutputDirectoryPrompt, PreviewAndDelete,
    SaveToPath,
};
use super::cleanup::CleanupGuard;
use super::handshake::{HandshakeCoordinator, HandshakeTimeouts};
use super::surface::{SurfaceError, SurfaceFactory, SurfaceHandle, TemplateAddress};
use super::token::{self, CorrelationToken};
use super::typst::TypstSurfaceFactory;
use super::{RenderError, RenderOutcome, RenderResult};
use crate::config::RenderConfig;
use crate::invoice::common::{format_invoice_date, suggested_file_name};
use crate::invoice::model::{RenderMode, RenderRequest};
use crate::invoice::validation::validate_request;
use crate::metrics;
use crate::preview::PreviewHost;

/// Settings that do not vary per request.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Template address; the token is appended per request.
    pub template: Url,
    pub timeouts: HandshakeTimeouts,
    /// Directory for PRINT-mode temporary artifacts.
    pub scratch_dir: PathBuf,
}

pub struct RenderPipeline {
    bus: SignalBus,
    factory: Arc<dyn SurfaceFactory>,
    template: Url,
    timeouts: HandshakeTimeouts,
    save: SaveToPath,
    preview: PreviewAndDelete,
}

impl RenderPipeline {
    pub fn new(
        bus: SignalBus,
        factory: Arc<dyn SurfaceFactory>,
        prompt: Arc<dyn DestinationPrompt>,
        preview_host: Arc<dyn PreviewHost>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            bus,
            factory,
            template: options.template,
            timeouts: options.timeouts,
            save: SaveToPath::new(prompt),
            preview: PreviewAndDelete::new(options.scratch_dir, preview_host),
        }
    }

    /// Typst surfaces, output-directory saves and the given preview host.
    pub fn from_config(config: &RenderConfig, preview_host: Arc<dyn PreviewHost>) -> Self {
        Self::new(
            SignalBus::new(),
            Arc::new(TypstSurfaceFactory::new(&config.typst_bin, config.page.clone())),
            Arc::new(OutputDirectoryPrompt::new(&config.output_dir)),
            preview_host,
            PipelineOptions {
                template: config.template.clone(),
                timeouts: config.timeouts,
                scratch_dir: config.scratch_dir.clone(),
            },
        )
    }

    pub fn bus(&self) -> &SignalBus {
        &self.bus
    }

    /// Render `request` to a PDF and save or preview it.
    pub async fn render_document(&self, request: RenderRequest) -> RenderResult {
        let token = token::issue();
        let mode = request.mode;
        let started = Instant::now();
        log::info!(
            "[token={} mode={}] render requested for '{}' ({} line items)",
            token,
            mode,
            request.payload.customer_name,
            request.payload.line_items.len()
        );

        let result = self.run(&token, &request).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(outcome) => {
                let label = match &outcome {
                    RenderOutcome::Cancelled => "cancelled",
                    _ => "complete",
                };
                log::info!(
                    "[token={} mode={}] render {} in {:.2}s",
                    token,
                    mode,
                    label,
                    elapsed
                );
                metrics::record_render(&mode.to_string(), label, elapsed);
                RenderResult::from_outcome(&token, outcome)
            }
            Err(e) => {
                log::error!("[token={} mode={}] render failed: {}", token, mode, e);
                metrics::record_render(&mode.to_string(), e.code(), elapsed);
                RenderResult::from_error(&token, mode, &e)
            }
        }
    }

    async fn run(
        &self,
        token: &CorrelationToken,
        request: &RenderRequest,
    ) -> Result<RenderOutcome, RenderError> {
        validate_request(request)?;
        let mut payload = serde_json::to_value(&request.payload)
            .map_err(|e| SurfaceError::Send(e.to_string()))?;
        if request.payload.date.trim().is_empty() {
            payload["date"] = Value::String(format_invoice_date());
        }

        let listener = self.bus.subscribe(token);
        let surface = self.factory.create(self.bus.clone()).await?;
        let mut guard = CleanupGuard::new(
            token.clone(),
            request.mode,
            listener,
            SurfaceHandle::new(token.clone(), surface),
        );
        let _in_flight = InFlight::enter();

        let mut coordinator = HandshakeCoordinator::new(token.clone(), self.timeouts);
        let address = TemplateAddress::new(&self.template, token);

        let produced = {
            let (surface, listener) = guard.parts();
            coordinator
                .produce(surface, listener, &address, &payload)
                .await
        };
        let bytes = match produced {
            Ok(bytes) => bytes,
            Err(e) => {
                guard.finish(coordinator.state());
                return Err(e);
            }
        };

        let artifact = CapturedArtifact {
            token: token.clone(),
            bytes,
            suggested_name: suggested_file_name(&request.payload),
        };
        let strategy: &dyn CaptureStrategy = match request.mode {
            RenderMode::Save => &self.save,
            RenderMode::Print => &self.preview,
        };
        let outcome = strategy.persist(artifact, request, &mut guard).await;

        let handshake = coordinator.handshake_mut();
        match &outcome {
            Ok(RenderOutcome::Cancelled) => handshake.cancel(),
            Ok(_) => {
                if let Err(e) = handshake.complete() {
                    log::error!("[token={}] {}", token, e);
                    handshake.fail();
                }
            }
            Err(_) => handshake.fail(),
        }
        guard.finish(coordinator.state());
        debug_assert!(coordinator.state().is_terminal());
        outcome
    }
}

/// Keeps the in-flight gauge accurate on every exit path.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        metrics::RENDERS_IN_FLIGHT.inc();
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        metrics::RENDERS_IN_FLIGHT.dec();
    }
}
