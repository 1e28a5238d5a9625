//! # Gatekeep Observe - Observability Layer
//!
//! Structured logging setup shared by the binary and integration tests.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies to the
/// workspace crates and `info` to everything else. Calling twice is a no-op
/// so tests can initialize freely.
pub fn init_tracing(default_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,gatekeep={}", default_level)));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true));

    if subscriber.try_init().is_err() {
        tracing::debug!("tracing already initialized, skipping");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    #[test]
    fn test_init_is_idempotent() {
        INIT.call_once(|| {
            init_tracing("debug").unwrap();
        });
        // A second call must not panic or error.
        init_tracing("info").unwrap();
    }
}
