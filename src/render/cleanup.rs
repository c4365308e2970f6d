//! Scoped release of per-request resources.
//!
//! A [`CleanupGuard`] owns the handshake listener and the rendering surface
//! for one token. Dropping it detaches the listener and destroys the surface
//! (unless the capture step already did), whatever path left the pipeline:
//! success, cancellation, error, or the render future being dropped.

use super::bus::Subscription;
use super::handshake::HandshakeState;
use super::surface::SurfaceHandle;
use super::token::CorrelationToken;
use crate::invoice::model::RenderMode;

pub struct CleanupGuard {
    token: CorrelationToken,
    mode: RenderMode,
    listener: Subscription,
    surface: SurfaceHandle,
    final_state: Option<HandshakeState>,
}

impl CleanupGuard {
    pub fn new(
        token: CorrelationToken,
        mode: RenderMode,
        listener: Subscription,
        surface: SurfaceHandle,
    ) -> Self {
        Self {
            token,
            mode,
            listener,
            surface,
            final_state: None,
        }
    }

    /// Surface and listener, borrowed together for the handshake.
    pub fn parts(&mut self) -> (&mut SurfaceHandle, &mut Subscription) {
        (&mut self.surface, &mut self.listener)
    }

    pub fn surface_mut(&mut self) -> &mut SurfaceHandle {
        &mut self.surface
    }

    /// Destroy the surface ahead of cleanup (the preview flow does this
    /// once the artifact is captured).
    pub fn release_surface(&mut self) {
        self.surface.destroy();
    }

    /// Record the terminal state for the cleanup log line.
    pub fn finish(&mut self, state: HandshakeState) {
        self.final_state = Some(state);
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let detached = self.listener.detach();
        let destroyed = self.surface.destroy();
        let state = self
            .final_state
            .map(|s| s.to_string())
            .unwrap_or_else(|| "ABANDONED".to_string());
        log::debug!(
            "[token={} mode={}] cleanup after {} (listener detached: {}, surface destroyed here: {})",
            self.token,
            self.mode,
            state,
            detached,
            destroyed
        );
    }
}
