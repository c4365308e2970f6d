//! Process-wide signal bus between rendering surfaces and pipelines.
//!
//! Surfaces publish handshake signals tagged with a correlation token. Each
//! pipeline subscribes for exactly its own token before the surface starts
//! loading; signals for tokens nobody listens to are dropped. The registry is
//! append-on-subscribe, remove-on-drop.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::token::CorrelationToken;

/// What a surface reports back to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalKind {
    /// The template can accept data.
    Ready,
    /// The template finished rendering the delivered data.
    Rendered,
    /// The surface failed while loading or rendering.
    Crashed { reason: String },
}

impl SignalKind {
    pub fn name(&self) -> &'static str {
        match self {
            SignalKind::Ready => "ready",
            SignalKind::Rendered => "rendered",
            SignalKind::Crashed { .. } => "crashed",
        }
    }
}

/// A handshake message as it travels over the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceSignal {
    pub token: CorrelationToken,
    pub kind: SignalKind,
}

impl SurfaceSignal {
    pub fn ready(token: &CorrelationToken) -> Self {
        Self {
            token: token.clone(),
            kind: SignalKind::Ready,
        }
    }

    pub fn rendered(token: &CorrelationToken) -> Self {
        Self {
            token: token.clone(),
            kind: SignalKind::Rendered,
        }
    }

    pub fn crashed(token: &CorrelationToken, reason: impl Into<String>) -> Self {
        Self {
            token: token.clone(),
            kind: SignalKind::Crashed {
                reason: reason.into(),
            },
        }
    }
}

struct Listener {
    id: u64,
    sender: mpsc::UnboundedSender<SurfaceSignal>,
}

/// Token → listener registry. Cheap to clone; all clones share one registry.
#[derive(Clone, Default)]
pub struct SignalBus {
    listeners: Arc<Mutex<HashMap<CorrelationToken, Listener>>>,
    next_id: Arc<AtomicU64>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener for `token`. The listener is removed when the
    /// returned [`Subscription`] is dropped.
    pub fn subscribe(&self, token: &CorrelationToken) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let previous = self
            .listeners
            .lock()
            .insert(token.clone(), Listener { id, sender });
        if previous.is_some() {
            log::warn!("replacing existing listener for token {}", token);
        }

        Subscription {
            token: token.clone(),
            id,
            bus: self.clone(),
            receiver,
            attached: true,
        }
    }

    /// Route a signal to the listener registered for its token.
    ///
    /// Returns `false` when nobody listens for that token (finished or
    /// foreign request); such signals are ignored.
    pub fn publish(&self, signal: SurfaceSignal) -> bool {
        let listeners = self.listeners.lock();
        match listeners.get(&signal.token) {
            Some(listener) => {
                let token = signal.token.clone();
                let kind = signal.kind.name();
                if listener.sender.send(signal).is_err() {
                    log::debug!("listener for token {} already closed, dropping {}", token, kind);
                    return false;
                }
                true
            }
            None => {
                log::debug!(
                    "ignoring {} signal for unknown token {}",
                    signal.kind.name(),
                    signal.token
                );
                false
            }
        }
    }

    /// Whether a listener is currently attached for `token`.
    pub fn is_listening(&self, token: &CorrelationToken) -> bool {
        self.listeners.lock().contains_key(token)
    }

    /// Number of attached listeners across all requests.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn remove(&self, token: &CorrelationToken, id: u64) {
        let mut listeners = self.listeners.lock();
        if listeners.get(token).is_some_and(|listener| listener.id == id) {
            listeners.remove(token);
            log::debug!("listener for token {} detached", token);
        }
    }
}

/// A live listener for one token.
pub struct Subscription {
    token: CorrelationToken,
    id: u64,
    bus: SignalBus,
    receiver: mpsc::UnboundedReceiver<SurfaceSignal>,
    attached: bool,
}

impl Subscription {
    pub fn token(&self) -> &CorrelationToken {
        &self.token
    }

    /// Next signal for this token, in publish order.
    pub async fn recv(&mut self) -> Option<SurfaceSignal> {
        self.receiver.recv().await
    }

    /// Remove this listener from the registry. Returns `true` only for the
    /// call that actually detached it.
    pub fn detach(&mut self) -> bool {
        if !self.attached {
            return false;
        }
        self.attached = false;
        self.bus.remove(&self.token, self.id);
        self.receiver.close();
        true
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}
