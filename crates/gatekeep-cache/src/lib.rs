//! # Gatekeep Cache - Decision Caching Layer
//!
//! Memoizes check outcomes keyed by the full check question. Entries carry
//! the zookie time they were stamped at; the evaluator bypasses any entry
//! older than a caller-supplied zookie, which is what defeats the new-enemy
//! hazard. Mutations purge by pattern: everything on the touched object,
//! everything referencing the touched subject, and one hop into a userset
//! subject's own relation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gatekeep_types::{CacheResult, RelationTuple, Subject};

pub mod keys;
pub mod moka_cache;
pub mod redis_cache;

pub use keys::{check_key, object_prefix, relation_prefix, subject_suffix};
pub use moka_cache::MokaCache;
pub use redis_cache::RedisCache;

/// A memoized check outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedDecision {
    pub allowed: bool,
    /// Zookie time of the check that produced this entry
    pub stamped_at_micros: i64,
}

impl CachedDecision {
    /// Whether this entry may serve a request carrying `input_zookie_micros`.
    /// An entry stamped earlier than the demanded zookie is unusable.
    pub fn usable_at(&self, input_zookie_micros: Option<i64>) -> bool {
        match input_zookie_micros {
            Some(min) => self.stamped_at_micros >= min,
            None => true,
        }
    }
}

/// The abstract decision cache.
///
/// Read failures are reported so the caller can degrade to a miss; a failed
/// invalidation must fail the surrounding write, or stale positives survive
/// a revoke.
#[async_trait]
pub trait DecisionCache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<CachedDecision>>;

    async fn put(&self, key: &str, decision: CachedDecision) -> CacheResult<()>;

    /// Purge every decision on `(namespace, object_id)`, all relations.
    async fn invalidate_object(&self, namespace: &str, object_id: &str) -> CacheResult<()>;

    /// Purge every decision referencing the subject.
    async fn invalidate_subject(&self, user_type: &str, user_id: &str) -> CacheResult<()>;

    /// Purge every decision on one `(namespace, object_id, relation)`.
    async fn invalidate_relation(
        &self,
        namespace: &str,
        object_id: &str,
        relation: &str,
    ) -> CacheResult<()>;

    /// Backend liveness probe.
    async fn ping(&self) -> CacheResult<()>;
}

/// Purge the decisions a tuple mutation can have changed.
///
/// Three patterns: the object's decisions, the subject's decisions, and,
/// when the subject is a userset, the referenced relation's decisions. The
/// userset hop is bounded to one level; TTL expiry heals anything deeper.
pub async fn purge_for_mutation(
    cache: &dyn DecisionCache,
    tuple: &RelationTuple,
) -> CacheResult<()> {
    cache.invalidate_object(&tuple.namespace, &tuple.object_id).await?;

    let (user_type, user_id) = tuple.subject.to_parts();
    cache.invalidate_subject(&user_type, &user_id).await?;

    if let Subject::Userset(userset) = &tuple.subject {
        cache
            .invalidate_relation(&userset.namespace, &userset.object_id, &userset.relation)
            .await?;
    }

    Ok(())
}
