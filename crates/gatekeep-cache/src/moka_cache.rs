//! In-process decision cache backed by moka.
//!
//! The default backend for single-node deployments and tests. Pattern
//! purges use moka's invalidation closures, so the cache must be built with
//! closure support enabled.

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use gatekeep_types::{CacheError, CacheResult};

use crate::{keys, CachedDecision, DecisionCache};

/// Default maximum number of cached decisions.
pub const DEFAULT_MAX_CAPACITY: u64 = 10_000;

/// Default entry TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

pub struct MokaCache {
    entries: Cache<String, CachedDecision>,
}

impl MokaCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();
        Self { entries }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_CAPACITY, DEFAULT_TTL)
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    fn invalidate_matching(
        &self,
        predicate: impl Fn(&String) -> bool + Send + Sync + 'static,
    ) -> CacheResult<()> {
        self.entries
            .invalidate_entries_if(move |key, _| predicate(key))
            .map_err(|e| CacheError::Backend(format!("invalidation predicate rejected: {}", e)))?;
        Ok(())
    }
}

impl Default for MokaCache {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl DecisionCache for MokaCache {
    async fn get(&self, key: &str) -> CacheResult<Option<CachedDecision>> {
        Ok(self.entries.get(key).await)
    }

    async fn put(&self, key: &str, decision: CachedDecision) -> CacheResult<()> {
        self.entries.insert(key.to_string(), decision).await;
        Ok(())
    }

    async fn invalidate_object(&self, namespace: &str, object_id: &str) -> CacheResult<()> {
        let prefix = keys::object_prefix(namespace, object_id);
        self.invalidate_matching(move |key| key.starts_with(&prefix))
    }

    async fn invalidate_subject(&self, user_type: &str, user_id: &str) -> CacheResult<()> {
        let suffix = keys::subject_suffix(user_type, user_id);
        self.invalidate_matching(move |key| key.ends_with(&suffix))
    }

    async fn invalidate_relation(
        &self,
        namespace: &str,
        object_id: &str,
        relation: &str,
    ) -> CacheResult<()> {
        let prefix = keys::relation_prefix(namespace, object_id, relation);
        self.invalidate_matching(move |key| key.starts_with(&prefix))
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check_key;

    fn decision(allowed: bool) -> CachedDecision {
        CachedDecision { allowed, stamped_at_micros: 1 }
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let cache = MokaCache::with_defaults();
        let key = check_key("document", "d1", "viewer", "user", "alice");

        assert!(cache.get(&key).await.unwrap().is_none());
        cache.put(&key, decision(true)).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(decision(true)));
    }

    #[tokio::test]
    async fn test_object_invalidation_purges_all_relations() {
        let cache = MokaCache::with_defaults();
        let viewer = check_key("document", "d1", "viewer", "user", "alice");
        let owner = check_key("document", "d1", "owner", "user", "bob");
        let other = check_key("document", "d2", "viewer", "user", "alice");

        cache.put(&viewer, decision(true)).await.unwrap();
        cache.put(&owner, decision(true)).await.unwrap();
        cache.put(&other, decision(false)).await.unwrap();

        cache.invalidate_object("document", "d1").await.unwrap();

        assert!(cache.get(&viewer).await.unwrap().is_none());
        assert!(cache.get(&owner).await.unwrap().is_none());
        assert_eq!(cache.get(&other).await.unwrap(), Some(decision(false)));
    }

    #[tokio::test]
    async fn test_subject_invalidation_purges_across_objects() {
        let cache = MokaCache::with_defaults();
        let d1 = check_key("document", "d1", "viewer", "user", "alice");
        let d2 = check_key("document", "d2", "owner", "user", "alice");
        let bob = check_key("document", "d1", "viewer", "user", "bob");

        cache.put(&d1, decision(true)).await.unwrap();
        cache.put(&d2, decision(true)).await.unwrap();
        cache.put(&bob, decision(true)).await.unwrap();

        cache.invalidate_subject("user", "alice").await.unwrap();

        assert!(cache.get(&d1).await.unwrap().is_none());
        assert!(cache.get(&d2).await.unwrap().is_none());
        assert!(cache.get(&bob).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_relation_invalidation_is_scoped() {
        let cache = MokaCache::with_defaults();
        let member = check_key("team", "t1", "member", "user", "bob");
        let lead = check_key("team", "t1", "lead", "user", "bob");

        cache.put(&member, decision(true)).await.unwrap();
        cache.put(&lead, decision(true)).await.unwrap();

        cache.invalidate_relation("team", "t1", "member").await.unwrap();

        assert!(cache.get(&member).await.unwrap().is_none());
        assert!(cache.get(&lead).await.unwrap().is_some());
    }
}
