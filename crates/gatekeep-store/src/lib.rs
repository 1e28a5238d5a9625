//! # Gatekeep Store - Tuple Storage Layer
//!
//! Durable storage of relation tuples behind four derived indexes, one per
//! access pattern the evaluator needs. Every write lands in all four indexes
//! or in none; reads pick the index matching their shape so no query falls
//! back to a full scan.

use async_trait::async_trait;

use gatekeep_types::{ChangeRecord, RelationTuple, StoreResult, Subject};

pub mod factory;
pub mod memory;
pub mod metrics;
#[cfg(feature = "scylla")]
pub mod scylla;

pub use factory::{BackendKind, StorageFactory, StoreConfig};
pub use memory::MemoryBackend;
pub use metrics::{MetricsSnapshot, StoreMetrics};

#[cfg(feature = "scylla")]
pub use crate::scylla::ScyllaBackend;

/// The abstract tuple store interface.
///
/// Implementations keep four indexes mutually consistent:
///
/// | index | partition | clustering |
/// |---|---|---|
/// | primary | (namespace, object_id) | (relation, subject) |
/// | by subject | subject | (namespace, object_id, relation) |
/// | object permissions | (namespace, object_id) | (relation, subject) |
/// | by relation | (namespace, relation) | (object_id, subject) |
#[async_trait]
pub trait TupleStore: Send + Sync {
    /// Write the tuple to all four indexes as one logical unit.
    ///
    /// Idempotent: re-inserting an existing key is a no-op and the stored
    /// insertion timestamp is not rewound. A mid-batch index failure
    /// surfaces as an error and leaves the tuple's state undefined from the
    /// caller's view; the caller retries.
    async fn insert(&self, tuple: &RelationTuple) -> StoreResult<()>;

    /// Remove the tuple from all four indexes. A missing entry is not an
    /// error.
    async fn delete(&self, tuple: &RelationTuple) -> StoreResult<()>;

    /// Single-key probe on the primary index.
    async fn find_direct(
        &self,
        namespace: &str,
        object_id: &str,
        relation: &str,
        subject: &Subject,
    ) -> StoreResult<bool>;

    /// All tuples on `(namespace, object_id, relation)`: the candidate set
    /// for userset expansion. Prefix scan on the primary index.
    async fn find_tuples_for(
        &self,
        namespace: &str,
        object_id: &str,
        relation: &str,
    ) -> StoreResult<Vec<RelationTuple>>;

    /// All tuples on an object across every relation. Scan on the
    /// object-permissions index.
    async fn find_by_object(
        &self,
        namespace: &str,
        object_id: &str,
    ) -> StoreResult<Vec<RelationTuple>>;

    /// Everything a subject can reach. Scan on the by-subject index; used
    /// for debug listings and invalidation-key derivation.
    async fn find_memberships(&self, subject: &Subject) -> StoreResult<Vec<RelationTuple>>;

    /// All tuples granting `relation` anywhere in `namespace`. Scan on the
    /// by-relation index.
    async fn find_by_relation(
        &self,
        namespace: &str,
        relation: &str,
    ) -> StoreResult<Vec<RelationTuple>>;

    /// Recent change records emitted by the write path, oldest first.
    async fn recent_changes(&self, limit: usize) -> StoreResult<Vec<ChangeRecord>>;

    /// Backend liveness probe.
    async fn ping(&self) -> StoreResult<()>;

    /// Operation counters, when the backend tracks them.
    fn metrics(&self) -> Option<MetricsSnapshot> {
        None
    }
}
