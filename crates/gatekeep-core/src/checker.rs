//! The permission checker.
//!
//! Evaluation walks an explicit frontier rather than the call stack: each
//! round probes every node in the frontier for a direct grant, then expands
//! misses through the permission hierarchy and through userset references
//! into the next frontier. A visited set keeps cycles and diamonds from
//! re-entering, and the frontier count bounds evaluation depth. Direct
//! probes within one frontier run concurrently; the first hit wins and the
//! remaining probes are reaped.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use gatekeep_cache::{check_key, CachedDecision, DecisionCache};
use gatekeep_store::TupleStore;
use gatekeep_types::{CheckRequest, EngineResult, StoreError, Subject};
use gatekeep_zookie::Zookie;

use crate::hierarchy::PermissionHierarchy;

/// Evaluator tuning knobs.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Maximum evaluation depth before a check is denied as unresolvable
    pub max_depth: usize,
    /// Concurrent direct probes per frontier
    pub probe_parallelism: usize,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self { max_depth: 16, probe_parallelism: 10 }
    }
}

/// One pending question in the traversal: does the subject hold `relation`
/// on `namespace:object_id`? The subject is fixed for the whole call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CheckNode {
    namespace: String,
    object_id: String,
    relation: String,
}

/// The recursive evaluator, orchestrating store and cache.
pub struct Checker {
    store: Arc<dyn TupleStore>,
    cache: Option<Arc<dyn DecisionCache>>,
    hierarchy: PermissionHierarchy,
    config: CheckerConfig,
}

impl Checker {
    pub fn new(
        store: Arc<dyn TupleStore>,
        cache: Option<Arc<dyn DecisionCache>>,
        config: CheckerConfig,
    ) -> Self {
        Self { store, cache, hierarchy: PermissionHierarchy::new(), config }
    }

    pub fn hierarchy(&self) -> &PermissionHierarchy {
        &self.hierarchy
    }

    /// Answer a check request.
    ///
    /// `input_zookie` is the caller's freshness demand: cache entries
    /// stamped earlier are bypassed. `stamp` is this check's own zookie
    /// time, recorded on the entry written back. Cache failures on this
    /// path degrade to a miss and never fail the check.
    #[instrument(skip(self, request), fields(check = %request.render()))]
    pub async fn check(
        &self,
        request: &CheckRequest,
        input_zookie: Option<Zookie>,
        stamp: Zookie,
    ) -> EngineResult<bool> {
        let subject = Subject::from_parts(request.user_type(), &request.user_id)?;
        let (user_type, user_id) = subject.to_parts();
        let key = check_key(
            &request.namespace,
            &request.object_id,
            &request.relation,
            &user_type,
            &user_id,
        );

        if let Some(cache) = &self.cache {
            match cache.get(&key).await {
                Ok(Some(entry))
                    if entry.usable_at(input_zookie.map(|z| z.timestamp_micros)) =>
                {
                    debug!(allowed = entry.allowed, "served from cache");
                    return Ok(entry.allowed);
                },
                Ok(_) => {},
                Err(e) => warn!(error = %e, "cache read failed, treating as miss"),
            }
        }

        let allowed = self
            .evaluate(&request.namespace, &request.object_id, &request.relation, &subject)
            .await?;

        if let Some(cache) = &self.cache {
            let entry = CachedDecision { allowed, stamped_at_micros: stamp.timestamp_micros };
            if let Err(e) = cache.put(&key, entry).await {
                warn!(error = %e, "cache write failed, continuing uncached");
            }
        }

        Ok(allowed)
    }

    /// Evaluate without consulting or populating the cache.
    pub async fn evaluate(
        &self,
        namespace: &str,
        object_id: &str,
        relation: &str,
        subject: &Subject,
    ) -> EngineResult<bool> {
        let root = CheckNode {
            namespace: namespace.to_string(),
            object_id: object_id.to_string(),
            relation: relation.to_string(),
        };

        let mut visited: HashSet<CheckNode> = HashSet::new();
        visited.insert(root.clone());
        let mut frontier = vec![root];

        for depth in 0..self.config.max_depth {
            if frontier.is_empty() {
                return Ok(false);
            }

            if self.probe_frontier(&frontier, subject).await? {
                debug!(depth, "direct grant found");
                return Ok(true);
            }

            frontier = self.expand_frontier(frontier, &mut visited).await?;
        }

        if !frontier.is_empty() {
            warn!(
                max_depth = self.config.max_depth,
                pending = frontier.len(),
                "evaluation depth bound exceeded, denying"
            );
        }
        Ok(false)
    }

    /// Phase 1 for a whole frontier: probe each node for a direct tuple,
    /// concurrently, short-circuiting on the first hit.
    async fn probe_frontier(
        &self,
        frontier: &[CheckNode],
        subject: &Subject,
    ) -> EngineResult<bool> {
        let mut probes: JoinSet<Result<bool, StoreError>> = JoinSet::new();

        for node in frontier {
            let store = Arc::clone(&self.store);
            let node = node.clone();
            let subject = subject.clone();

            probes.spawn(async move {
                store.find_direct(&node.namespace, &node.object_id, &node.relation, &subject).await
            });

            if probes.len() >= self.config.probe_parallelism {
                if let Some(joined) = probes.join_next().await {
                    if Self::join_probe(joined)? {
                        probes.shutdown().await;
                        return Ok(true);
                    }
                }
            }
        }

        while let Some(joined) = probes.join_next().await {
            if Self::join_probe(joined)? {
                probes.shutdown().await;
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn join_probe(
        joined: Result<Result<bool, StoreError>, tokio::task::JoinError>,
    ) -> EngineResult<bool> {
        let hit = joined
            .map_err(|e| StoreError::Backend(format!("probe task failed: {}", e)))??;
        Ok(hit)
    }

    /// Phases 2 and 3 for every missed node: enqueue the strictly higher
    /// chain relations and any userset grants on the node itself.
    async fn expand_frontier(
        &self,
        frontier: Vec<CheckNode>,
        visited: &mut HashSet<CheckNode>,
    ) -> EngineResult<Vec<CheckNode>> {
        let mut next = Vec::new();

        for node in frontier {
            for higher in self.hierarchy.relations_above(&node.relation) {
                let candidate = CheckNode {
                    namespace: node.namespace.clone(),
                    object_id: node.object_id.clone(),
                    relation: higher.to_string(),
                };
                if visited.insert(candidate.clone()) {
                    next.push(candidate);
                }
            }

            let tuples = self
                .store
                .find_tuples_for(&node.namespace, &node.object_id, &node.relation)
                .await?;

            for tuple in tuples {
                if let Some(userset) = tuple.subject.as_userset() {
                    let candidate = CheckNode {
                        namespace: userset.namespace.clone(),
                        object_id: userset.object_id.clone(),
                        relation: userset.relation.clone(),
                    };
                    if visited.insert(candidate.clone()) {
                        next.push(candidate);
                    }
                }
            }
        }

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeep_cache::MokaCache;
    use gatekeep_store::MemoryBackend;
    use gatekeep_types::RelationTuple;

    fn checker(store: Arc<dyn TupleStore>) -> Checker {
        Checker::new(store, None, CheckerConfig::default())
    }

    fn cached_checker(store: Arc<dyn TupleStore>, cache: Arc<dyn DecisionCache>) -> Checker {
        Checker::new(store, Some(cache), CheckerConfig::default())
    }

    async fn insert(store: &dyn TupleStore, ns: &str, obj: &str, rel: &str, ut: &str, uid: &str) {
        let subject = Subject::from_parts(ut, uid).unwrap();
        store
            .insert(&RelationTuple::new(ns, obj, rel, subject, 1_000))
            .await
            .unwrap();
    }

    fn request(ns: &str, obj: &str, rel: &str, uid: &str) -> CheckRequest {
        CheckRequest {
            namespace: ns.to_string(),
            object_id: obj.to_string(),
            relation: rel.to_string(),
            user_id: uid.to_string(),
            user_type: None,
            zookie: None,
        }
    }

    fn alice() -> Subject {
        Subject::direct("user", "alice")
    }

    #[tokio::test]
    async fn test_direct_grant() {
        let store = Arc::new(MemoryBackend::new());
        insert(&*store, "document", "d1", "viewer", "user", "alice").await;

        let checker = checker(store);
        assert!(checker.evaluate("document", "d1", "viewer", &alice()).await.unwrap());
        assert!(!checker.evaluate("document", "d1", "owner", &alice()).await.unwrap());
    }

    #[tokio::test]
    async fn test_owner_inherits_down_to_viewer() {
        let store = Arc::new(MemoryBackend::new());
        insert(&*store, "document", "d1", "owner", "user", "alice").await;

        let checker = checker(store);
        for relation in ["owner", "admin", "editor", "commenter", "viewer"] {
            assert!(
                checker.evaluate("document", "d1", relation, &alice()).await.unwrap(),
                "owner should satisfy {}",
                relation
            );
        }
    }

    #[tokio::test]
    async fn test_viewer_does_not_escalate() {
        let store = Arc::new(MemoryBackend::new());
        insert(&*store, "document", "d1", "viewer", "user", "alice").await;

        let checker = checker(store);
        for relation in ["commenter", "editor", "admin", "owner"] {
            assert!(
                !checker.evaluate("document", "d1", relation, &alice()).await.unwrap(),
                "viewer must not satisfy {}",
                relation
            );
        }
    }

    #[tokio::test]
    async fn test_userset_grant() {
        let store = Arc::new(MemoryBackend::new());
        insert(&*store, "team", "t1", "member", "user", "bob").await;
        insert(&*store, "document", "d2", "editor", "userset", "team:t1#member").await;

        let checker = checker(store);
        let bob = Subject::direct("user", "bob");
        assert!(checker.evaluate("document", "d2", "editor", &bob).await.unwrap());
        // Non-members stay out.
        assert!(!checker.evaluate("document", "d2", "editor", &alice()).await.unwrap());
    }

    #[tokio::test]
    async fn test_userset_combined_with_inheritance() {
        let store = Arc::new(MemoryBackend::new());
        insert(&*store, "team", "t1", "member", "user", "bob").await;
        insert(&*store, "document", "d2", "editor", "userset", "team:t1#member").await;

        // bob reaches viewer through editor through team membership.
        let checker = checker(store);
        let bob = Subject::direct("user", "bob");
        assert!(checker.evaluate("document", "d2", "viewer", &bob).await.unwrap());
    }

    #[tokio::test]
    async fn test_nested_usersets() {
        let store = Arc::new(MemoryBackend::new());
        insert(&*store, "group", "g2", "member", "user", "erin").await;
        insert(&*store, "group", "g1", "member", "userset", "group:g2#member").await;
        insert(&*store, "document", "d4", "editor", "userset", "group:g1#member").await;

        let checker = checker(store);
        let erin = Subject::direct("user", "erin");
        assert!(checker.evaluate("document", "d4", "editor", &erin).await.unwrap());
    }

    #[tokio::test]
    async fn test_userset_cycle_terminates_and_denies() {
        let store = Arc::new(MemoryBackend::new());
        insert(&*store, "document", "d4", "editor", "userset", "group:g1#member").await;
        insert(&*store, "group", "g1", "member", "userset", "group:g2#member").await;
        insert(&*store, "group", "g2", "member", "userset", "group:g1#member").await;

        let checker = checker(store);
        let dave = Subject::direct("user", "dave");
        assert!(!checker.evaluate("document", "d4", "editor", &dave).await.unwrap());
    }

    #[tokio::test]
    async fn test_depth_bound_denies() {
        let store = Arc::new(MemoryBackend::new());
        // A membership chain deeper than the configured bound.
        for i in 0..6 {
            insert(
                &*store,
                "group",
                &format!("g{}", i),
                "member",
                "userset",
                &format!("group:g{}#member", i + 1),
            )
            .await;
        }
        insert(&*store, "group", "g6", "member", "user", "frank").await;

        let shallow = Checker::new(
            store.clone() as Arc<dyn TupleStore>,
            None,
            CheckerConfig { max_depth: 3, probe_parallelism: 10 },
        );
        let frank = Subject::direct("user", "frank");
        assert!(!shallow.evaluate("group", "g0", "member", &frank).await.unwrap());

        // A deeper bound resolves the same chain.
        let deep = checker(store);
        assert!(deep.evaluate("group", "g0", "member", &frank).await.unwrap());
    }

    #[tokio::test]
    async fn test_check_populates_and_serves_cache() {
        let store = Arc::new(MemoryBackend::new());
        insert(&*store, "document", "d1", "owner", "user", "alice").await;
        let cache = Arc::new(MokaCache::with_defaults());

        let checker = cached_checker(store.clone(), cache.clone());
        let req = request("document", "d1", "viewer", "alice");

        assert!(checker.check(&req, None, Zookie::from_micros(10)).await.unwrap());

        let key = check_key("document", "d1", "viewer", "user", "alice");
        let entry = cache.get(&key).await.unwrap().unwrap();
        assert!(entry.allowed);
        assert_eq!(entry.stamped_at_micros, 10);
    }

    #[tokio::test]
    async fn test_input_zookie_bypasses_stale_entry() {
        let store = Arc::new(MemoryBackend::new());
        let cache = Arc::new(MokaCache::with_defaults());

        // A stale allow sits in the cache, but the store has been revoked.
        let key = check_key("document", "d3", "viewer", "user", "carol");
        cache
            .put(&key, CachedDecision { allowed: true, stamped_at_micros: 100 })
            .await
            .unwrap();

        let checker = cached_checker(store, cache);
        let req = request("document", "d3", "viewer", "carol");

        // Without a zookie the stale entry is served.
        assert!(checker.check(&req, None, Zookie::from_micros(300)).await.unwrap());

        // With a newer zookie the entry is bypassed and the store consulted.
        let fresh = Zookie::from_micros(200);
        assert!(!checker.check(&req, Some(fresh), Zookie::from_micros(300)).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_tuples_are_deny_not_error() {
        let store = Arc::new(MemoryBackend::new());
        let checker = checker(store);
        assert!(!checker.evaluate("document", "ghost", "viewer", &alice()).await.unwrap());
    }
}
