//! # Gatekeep Zookie
//!
//! Consistency tokens. A zookie encodes a logical read timestamp; every
//! write and every check hands one back, and a check that carries one in
//! demands a view no older than it. Callers treat the encoded form as
//! opaque.

use std::sync::atomic::{AtomicI64, Ordering};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use gatekeep_types::{EngineError, EngineResult};

/// A decoded consistency token: a microsecond wall-clock timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Zookie {
    pub timestamp_micros: i64,
}

impl Zookie {
    pub fn from_micros(timestamp_micros: i64) -> Self {
        Self { timestamp_micros }
    }

    /// Serialize to the opaque wire form: base64 over a stable JSON body.
    pub fn encode(&self) -> String {
        // A struct of one i64 cannot fail to serialize.
        let json = serde_json::to_string(self).expect("zookie serialization is infallible");
        BASE64.encode(json)
    }

    /// Parse the opaque wire form. Undecodable input is a validation error.
    pub fn decode(encoded: &str) -> EngineResult<Self> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| EngineError::Validation(format!("invalid zookie encoding: {}", e)))?;
        let json = String::from_utf8(bytes)
            .map_err(|e| EngineError::Validation(format!("invalid zookie payload: {}", e)))?;
        serde_json::from_str(&json)
            .map_err(|e| EngineError::Validation(format!("invalid zookie format: {}", e)))
    }

    /// True when this token is at least as fresh as `other`.
    pub fn is_at_least(&self, other: &Zookie) -> bool {
        self.timestamp_micros >= other.timestamp_micros
    }
}

impl std::fmt::Display for Zookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Mints zookies that are strictly increasing within one process.
///
/// The wall clock drives the timestamp; when two mints land in the same
/// microsecond (or the clock steps backwards) the counter advances by one
/// instead, so no two tokens from this mint ever compare equal.
pub struct ZookieMint {
    last_micros: AtomicI64,
}

impl ZookieMint {
    pub fn new() -> Self {
        Self { last_micros: AtomicI64::new(0) }
    }

    /// Mint a token for the current instant, strictly greater than any token
    /// previously returned by this mint.
    pub fn now(&self) -> Zookie {
        let wall = Utc::now().timestamp_micros();
        let mut stamped = 0;
        self.last_micros
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                stamped = wall.max(last + 1);
                Some(stamped)
            })
            .expect("fetch_update closure always returns Some");
        Zookie::from_micros(stamped)
    }
}

impl Default for ZookieMint {
    fn default() -> Self {
        Self::new()
    }
}
