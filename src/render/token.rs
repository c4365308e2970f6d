//! Correlation tokens.
//!
//! A token is issued per render request and echoed back by the rendering
//! surface on every handshake signal, so signals from concurrent requests
//! can never be attributed to the wrong pipeline.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Opaque per-request identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    /// Wrap a token received from the outside (e.g. parsed from a load address).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issue a fresh token: millisecond timestamp, process-local sequence and
/// 64 random bits.
pub fn issue() -> CorrelationToken {
    let millis = Utc::now().timestamp_millis();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let random = Uuid::new_v4().as_u128() as u64;
    CorrelationToken(format!("{millis:x}-{seq:x}-{random:016x}"))
}
