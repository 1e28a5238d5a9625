//! Redis-backed decision cache for multi-node deployments.
//!
//! Entries are JSON values under `SET ... EX`; pattern purges use
//! `KEYS` + `DEL`. A scan-based purge is expensive on large keyspaces, and
//! accepted here: the `check:` namespace is the only keyspace this client
//! touches, and TTL caps how much can accumulate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use tracing::{debug, warn};

use gatekeep_types::{CacheError, CacheResult};

use crate::{keys, CachedDecision, DecisionCache};

pub struct RedisCache {
    client: Arc<Client>,
    ttl: Duration,
}

impl RedisCache {
    pub fn new(client: Arc<Client>, ttl: Duration) -> Self {
        Self { client, ttl }
    }

    /// Connect to `redis://{host}:{port}`.
    pub fn connect(host: &str, port: u16, ttl: Duration) -> CacheResult<Self> {
        let url = format!("redis://{}:{}", host, port);
        let client = Client::open(url)
            .map_err(|e| CacheError::Backend(format!("redis client init failed: {}", e)))?;
        Ok(Self::new(Arc::new(client), ttl))
    }

    async fn connection(&self) -> CacheResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Backend(format!("redis connection failed: {}", e)))
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<()> {
        let mut conn = self.connection().await?;

        let matched: Vec<String> = conn
            .keys(pattern)
            .await
            .map_err(|e| CacheError::Backend(format!("keys lookup failed: {}", e)))?;

        if matched.is_empty() {
            debug!(pattern, "no cache keys matched");
            return Ok(());
        }

        let deleted: u64 = conn
            .del(matched)
            .await
            .map_err(|e| CacheError::Backend(format!("pattern delete failed: {}", e)))?;
        debug!(pattern, deleted, "cache keys purged");
        Ok(())
    }
}

#[async_trait]
impl DecisionCache for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<CachedDecision>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| CacheError::Backend(format!("cache get failed: {}", e)))?;

        match value {
            Some(json) => match serde_json::from_str(&json) {
                Ok(decision) => Ok(Some(decision)),
                Err(e) => {
                    // A corrupt entry is dropped rather than surfaced.
                    warn!(key, error = %e, "discarding undecodable cache entry");
                    Ok(None)
                },
            },
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, decision: CachedDecision) -> CacheResult<()> {
        let json = serde_json::to_string(&decision)?;
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(key, json, self.ttl.as_secs())
            .await
            .map_err(|e| CacheError::Backend(format!("cache set failed: {}", e)))?;
        Ok(())
    }

    async fn invalidate_object(&self, namespace: &str, object_id: &str) -> CacheResult<()> {
        let pattern = format!("{}*", keys::object_prefix(namespace, object_id));
        self.delete_pattern(&pattern).await
    }

    async fn invalidate_subject(&self, user_type: &str, user_id: &str) -> CacheResult<()> {
        let pattern = format!("check:*{}", keys::subject_suffix(user_type, user_id));
        self.delete_pattern(&pattern).await
    }

    async fn invalidate_relation(
        &self,
        namespace: &str,
        object_id: &str,
        relation: &str,
    ) -> CacheResult<()> {
        let pattern = format!("{}*", keys::relation_prefix(namespace, object_id, relation));
        self.delete_pattern(&pattern).await
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("cache ping failed: {}", e)))?;
        Ok(())
    }
}
