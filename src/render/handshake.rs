//! Host ↔ surface handshake.
//!
//! [`Handshake`] is the pure transition table; [`HandshakeCoordinator`]
//! drives it against a live surface and signal subscription, enforcing the
//! ready → data → rendered ordering and the bounded waits.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{timeout, timeout_at, Instant};

use super::bus::{SignalKind, Subscription, SurfaceSignal};
use super::surface::{SurfaceError, SurfaceHandle, TemplateAddress};
use super::token::CorrelationToken;
use super::RenderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandshakeState {
    Created,
    Loading,
    AwaitingReady,
    DataSent,
    AwaitingRenderComplete,
    Capturing,
    Complete,
    Cancelled,
    Failed,
}

impl HandshakeState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            HandshakeState::Complete | HandshakeState::Cancelled | HandshakeState::Failed
        )
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeState::Created => "CREATED",
            HandshakeState::Loading => "LOADING",
            HandshakeState::AwaitingReady => "AWAITING_READY",
            HandshakeState::DataSent => "DATA_SENT",
            HandshakeState::AwaitingRenderComplete => "AWAITING_RENDER_COMPLETE",
            HandshakeState::Capturing => "CAPTURING",
            HandshakeState::Complete => "COMPLETE",
            HandshakeState::Cancelled => "CANCELLED",
            HandshakeState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Which suspension point a timeout hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStage {
    /// Template load (navigation) completing.
    Load,
    Ready,
    Rendered,
    /// Printing the rendered surface to bytes.
    Capture,
}

impl fmt::Display for WaitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitStage::Load => f.write_str("template load"),
            WaitStage::Ready => f.write_str("ready signal"),
            WaitStage::Rendered => f.write_str("rendered signal"),
            WaitStage::Capture => f.write_str("capture"),
        }
    }
}

/// What the host must do after observing a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Push the payload to the surface.
    SendData,
    /// Keep waiting for the rendered signal.
    AwaitRender,
    /// Print the surface to bytes.
    Capture,
    /// The surface reported a crash for this token.
    Crashed(String),
    /// Signal is foreign, duplicated or out of place; state unchanged.
    Ignored,
}

#[derive(Debug, Error)]
#[error("illegal handshake transition from {from} on {event}")]
pub struct IllegalTransition {
    pub from: HandshakeState,
    pub event: &'static str,
}

/// Pure handshake state machine for one token.
#[derive(Debug)]
pub struct Handshake {
    token: CorrelationToken,
    state: HandshakeState,
    rendered_early: bool,
}

impl Handshake {
    pub fn new(token: CorrelationToken) -> Self {
        Self {
            token,
            state: HandshakeState::Created,
            rendered_early: false,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn token(&self) -> &CorrelationToken {
        &self.token
    }

    pub fn begin_load(&mut self) -> Result<(), IllegalTransition> {
        self.expect(HandshakeState::Created, "load")?;
        self.set_state(HandshakeState::Loading);
        Ok(())
    }

    pub fn load_finished(&mut self) -> Result<(), IllegalTransition> {
        self.expect(HandshakeState::Loading, "load finished")?;
        self.set_state(HandshakeState::AwaitingReady);
        Ok(())
    }

    /// Feed a signal from the bus.
    pub fn observe(&mut self, signal: &SurfaceSignal) -> Transition {
        if signal.token != self.token {
            log::debug!(
                "[token={}] ignoring {} signal for token {}",
                self.token,
                signal.kind.name(),
                signal.token
            );
            return Transition::Ignored;
        }
        if self.state.is_terminal() {
            return Transition::Ignored;
        }

        match (&signal.kind, self.state) {
            (SignalKind::Ready, HandshakeState::Loading | HandshakeState::AwaitingReady) => {
                self.set_state(HandshakeState::DataSent);
                Transition::SendData
            }
            (
                SignalKind::Rendered,
                HandshakeState::DataSent | HandshakeState::AwaitingRenderComplete,
            ) => {
                self.set_state(HandshakeState::Capturing);
                Transition::Capture
            }
            (SignalKind::Rendered, HandshakeState::Loading | HandshakeState::AwaitingReady) => {
                log::debug!("[token={}] rendered signal before data delivery", self.token);
                self.rendered_early = true;
                Transition::Ignored
            }
            (SignalKind::Crashed { reason }, _) => {
                self.set_state(HandshakeState::Failed);
                Transition::Crashed(reason.clone())
            }
            (kind, state) => {
                log::debug!(
                    "[token={}] ignoring {} signal in state {}",
                    self.token,
                    kind.name(),
                    state
                );
                Transition::Ignored
            }
        }
    }

    /// The payload reached the surface.
    pub fn data_delivered(&mut self) -> Result<Transition, IllegalTransition> {
        self.expect(HandshakeState::DataSent, "data delivered")?;
        if self.rendered_early {
            self.set_state(HandshakeState::Capturing);
            return Ok(Transition::Capture);
        }
        self.set_state(HandshakeState::AwaitingRenderComplete);
        Ok(Transition::AwaitRender)
    }

    pub fn complete(&mut self) -> Result<(), IllegalTransition> {
        self.expect(HandshakeState::Capturing, "complete")?;
        self.set_state(HandshakeState::Complete);
        Ok(())
    }

    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            self.set_state(HandshakeState::Cancelled);
        }
    }

    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.set_state(HandshakeState::Failed);
        }
    }

    fn expect(&self, state: HandshakeState, event: &'static str) -> Result<(), IllegalTransition> {
        if self.state == state {
            Ok(())
        } else {
            Err(IllegalTransition {
                from: self.state,
                event,
            })
        }
    }

    fn set_state(&mut self, next: HandshakeState) {
        log::debug!("[token={}] handshake {} -> {}", self.token, self.state, next);
        self.state = next;
    }
}

/// Bounds on the two signal waits.
#[derive(Debug, Clone, Copy)]
pub struct HandshakeTimeouts {
    pub ready: Duration,
    pub rendered: Duration,
}

impl Default for HandshakeTimeouts {
    fn default() -> Self {
        Self {
            ready: Duration::from_secs(10),
            rendered: Duration::from_secs(10),
        }
    }
}

/// Drives one handshake from load to captured bytes.
pub struct HandshakeCoordinator {
    handshake: Handshake,
    timeouts: HandshakeTimeouts,
}

impl HandshakeCoordinator {
    pub fn new(token: CorrelationToken, timeouts: HandshakeTimeouts) -> Self {
        Self {
            handshake: Handshake::new(token),
            timeouts,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.handshake.state()
    }

    pub fn handshake_mut(&mut self) -> &mut Handshake {
        &mut self.handshake
    }

    /// Load the template, exchange ready → data → rendered and capture.
    ///
    /// `listener` must already be attached for this token; it is borrowed by
    /// the load call. On error the handshake ends in `FAILED`.
    pub async fn produce(
        &mut self,
        surface: &mut SurfaceHandle,
        listener: &mut Subscription,
        address: &TemplateAddress,
        payload: &Value,
    ) -> Result<Vec<u8>, RenderError> {
        let result = self.drive(surface, listener, address, payload).await;
        if result.is_err() {
            self.handshake.fail();
        }
        result
    }

    async fn drive(
        &mut self,
        surface: &mut SurfaceHandle,
        listener: &mut Subscription,
        address: &TemplateAddress,
        payload: &Value,
    ) -> Result<Vec<u8>, RenderError> {
        self.handshake.begin_load()?;
        bounded(
            WaitStage::Load,
            self.timeouts.ready,
            surface.load(address, listener),
        )
        .await?;
        self.handshake.load_finished()?;

        self.await_transition(
            listener,
            WaitStage::Ready,
            Transition::SendData,
            self.timeouts.ready,
        )
        .await?;
        surface.send_data(payload).await?;

        if self.handshake.data_delivered()? != Transition::Capture {
            self.await_transition(
                listener,
                WaitStage::Rendered,
                Transition::Capture,
                self.timeouts.rendered,
            )
            .await?;
        }

        let bytes = bounded(WaitStage::Capture, self.timeouts.rendered, surface.capture()).await?;
        log::debug!(
            "[token={}] captured {} bytes",
            self.handshake.token(),
            bytes.len()
        );
        Ok(bytes)
    }

    /// Wait until a signal producing `expected` arrives, skipping ignored ones.
    async fn await_transition(
        &mut self,
        listener: &mut Subscription,
        stage: WaitStage,
        expected: Transition,
        bound: Duration,
    ) -> Result<(), RenderError> {
        let deadline = Instant::now() + bound;

        loop {
            let signal = match timeout_at(deadline, listener.recv()).await {
                Ok(Some(signal)) => signal,
                Ok(None) => {
                    return Err(SurfaceError::Crashed("signal listener closed".to_string()).into())
                }
                Err(_) => return Err(RenderError::HandshakeTimeout { stage, bound }),
            };

            match self.handshake.observe(&signal) {
                Transition::Crashed(reason) => return Err(SurfaceError::Crashed(reason).into()),
                transition if transition == expected => return Ok(()),
                _ => continue,
            }
        }
    }
}

/// Run one surface call under `bound`.
async fn bounded<T, F>(stage: WaitStage, bound: Duration, call: F) -> Result<T, RenderError>
where
    F: Future<Output = Result<T, SurfaceError>>,
{
    match timeout(bound, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(RenderError::HandshakeTimeout { stage, bound }),
    }
}
