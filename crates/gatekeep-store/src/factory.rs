//! Storage factory for creating backend instances.
//!
//! Lets the binary pick a backend from configuration without consumers
//! knowing implementation details.

use std::str::FromStr;
use std::sync::Arc;

use gatekeep_types::{StoreError, StoreResult};

use crate::memory::MemoryBackend;
use crate::TupleStore;

/// Storage backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// In-memory storage (testing, development, single-node deployments)
    Memory,
    /// ScyllaDB storage (production)
    #[cfg(feature = "scylla")]
    Scylla,
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            #[cfg(feature = "scylla")]
            "scylla" | "scylladb" => Ok(BackendKind::Scylla),
            _ => Err(StoreError::Backend(format!("unknown backend kind: {}", s))),
        }
    }
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            #[cfg(feature = "scylla")]
            BackendKind::Scylla => "scylla",
        }
    }
}

/// Connection settings handed to the factory.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: BackendKind,
    pub host: String,
    pub port: u16,
    pub keyspace: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            host: "localhost".to_string(),
            port: 9042,
            keyspace: "gatekeep".to_string(),
        }
    }
}

/// Creates store backends from configuration.
pub struct StorageFactory;

impl StorageFactory {
    pub async fn create(config: StoreConfig) -> StoreResult<Arc<dyn TupleStore>> {
        match config.backend {
            BackendKind::Memory => Ok(Arc::new(MemoryBackend::new()) as Arc<dyn TupleStore>),
            #[cfg(feature = "scylla")]
            BackendKind::Scylla => {
                let backend =
                    crate::scylla::ScyllaBackend::connect(&config.host, config.port, &config.keyspace)
                        .await?;
                Ok(Arc::new(backend) as Arc<dyn TupleStore>)
            },
        }
    }

    /// Shorthand for the default in-memory backend.
    pub fn memory() -> Arc<dyn TupleStore> {
        Arc::new(MemoryBackend::new()) as Arc<dyn TupleStore>
    }
}
