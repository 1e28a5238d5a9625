//! In-memory storage backend with full four-index support.
//!
//! The default backend for development and tests. All four indexes live
//! under a single write lock, so index atomicity holds trivially; the write
//! ordering still mirrors the remote backends (secondaries first, primary
//! last) so both paths read the same way.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use gatekeep_types::{ChangeRecord, Operation, RelationTuple, StoreResult, Subject};

use crate::{MetricsSnapshot, StoreMetrics, TupleStore};

/// Change records kept before the oldest are dropped.
const CHANGE_LOG_CAPACITY: usize = 10_000;

type ObjectKey = (String, String);
type SubjectKey = (String, String);
type RelationKey = (String, String);

/// Clustering position within an object partition: (relation, subject parts).
type ObjectClustering = (String, SubjectKey);

#[derive(Default)]
struct StoreData {
    /// Primary index: (namespace, object_id) -> (relation, subject) -> tuple
    primary: HashMap<ObjectKey, BTreeMap<ObjectClustering, RelationTuple>>,

    /// By-subject index: subject -> (namespace, object_id, relation) -> tuple
    by_subject: HashMap<SubjectKey, BTreeMap<(String, String, String), RelationTuple>>,

    /// Object-permissions index: (namespace, object_id) -> (relation, subject) -> tuple
    object_permissions: HashMap<ObjectKey, BTreeMap<ObjectClustering, RelationTuple>>,

    /// By-relation index: (namespace, relation) -> (object_id, subject) -> tuple
    by_relation: HashMap<RelationKey, BTreeMap<(String, SubjectKey), RelationTuple>>,

    /// Bounded log of applied mutations, oldest first
    change_log: VecDeque<ChangeRecord>,
}

impl StoreData {
    fn push_change(&mut self, operation: Operation, tuple: RelationTuple, at_micros: i64) {
        if self.change_log.len() >= CHANGE_LOG_CAPACITY {
            self.change_log.pop_front();
        }
        self.change_log.push_back(ChangeRecord { operation, tuple, at_micros });
    }
}

/// In-memory tuple store with the four derived indexes.
pub struct MemoryBackend {
    data: Arc<RwLock<StoreData>>,
    metrics: Arc<StoreMetrics>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(StoreData::default())),
            metrics: Arc::new(StoreMetrics::new()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TupleStore for MemoryBackend {
    async fn insert(&self, tuple: &RelationTuple) -> StoreResult<()> {
        self.metrics.record_insert();
        let mut data = self.data.write().await;

        let object_key = (tuple.namespace.clone(), tuple.object_id.clone());
        let subject_key = tuple.subject.to_parts();
        let clustering = (tuple.relation.clone(), subject_key.clone());

        // Idempotent: an existing key keeps its original created_at.
        if data
            .primary
            .get(&object_key)
            .is_some_and(|partition| partition.contains_key(&clustering))
        {
            return Ok(());
        }

        data.by_subject.entry(subject_key.clone()).or_default().insert(
            (tuple.namespace.clone(), tuple.object_id.clone(), tuple.relation.clone()),
            tuple.clone(),
        );

        data.object_permissions
            .entry(object_key.clone())
            .or_default()
            .insert(clustering.clone(), tuple.clone());

        data.by_relation
            .entry((tuple.namespace.clone(), tuple.relation.clone()))
            .or_default()
            .insert((tuple.object_id.clone(), subject_key), tuple.clone());

        // Primary last, so a reader that finds a tuple here can locate it in
        // every secondary.
        data.primary.entry(object_key).or_default().insert(clustering, tuple.clone());

        data.push_change(Operation::Insert, tuple.clone(), tuple.created_at_micros);

        Ok(())
    }

    async fn delete(&self, tuple: &RelationTuple) -> StoreResult<()> {
        self.metrics.record_delete();
        let mut data = self.data.write().await;

        let object_key = (tuple.namespace.clone(), tuple.object_id.clone());
        let subject_key = tuple.subject.to_parts();
        let clustering = (tuple.relation.clone(), subject_key.clone());

        let existed = data
            .primary
            .get_mut(&object_key)
            .and_then(|partition| partition.remove(&clustering))
            .is_some();

        let emptied = data.by_subject.get_mut(&subject_key).map(|partition| {
            partition.remove(&(
                tuple.namespace.clone(),
                tuple.object_id.clone(),
                tuple.relation.clone(),
            ));
            partition.is_empty()
        });
        if emptied == Some(true) {
            data.by_subject.remove(&subject_key);
        }

        let emptied = data.object_permissions.get_mut(&object_key).map(|partition| {
            partition.remove(&clustering);
            partition.is_empty()
        });
        if emptied == Some(true) {
            data.object_permissions.remove(&object_key);
        }

        let relation_key = (tuple.namespace.clone(), tuple.relation.clone());
        let emptied = data.by_relation.get_mut(&relation_key).map(|partition| {
            partition.remove(&(tuple.object_id.clone(), subject_key));
            partition.is_empty()
        });
        if emptied == Some(true) {
            data.by_relation.remove(&relation_key);
        }

        if data.primary.get(&object_key).is_some_and(|p| p.is_empty()) {
            data.primary.remove(&object_key);
        }

        if existed {
            data.push_change(Operation::Delete, tuple.clone(), Utc::now().timestamp_micros());
        }

        Ok(())
    }

    async fn find_direct(
        &self,
        namespace: &str,
        object_id: &str,
        relation: &str,
        subject: &Subject,
    ) -> StoreResult<bool> {
        self.metrics.record_read();
        let data = self.data.read().await;

        let object_key = (namespace.to_string(), object_id.to_string());
        let clustering = (relation.to_string(), subject.to_parts());

        Ok(data
            .primary
            .get(&object_key)
            .is_some_and(|partition| partition.contains_key(&clustering)))
    }

    async fn find_tuples_for(
        &self,
        namespace: &str,
        object_id: &str,
        relation: &str,
    ) -> StoreResult<Vec<RelationTuple>> {
        self.metrics.record_read();
        let data = self.data.read().await;

        let object_key = (namespace.to_string(), object_id.to_string());
        let Some(partition) = data.primary.get(&object_key) else {
            return Ok(Vec::new());
        };

        // Prefix scan over the clustering order: all subjects under one
        // relation are contiguous.
        let start = (relation.to_string(), (String::new(), String::new()));
        let tuples = partition
            .range(start..)
            .take_while(|((rel, _), _)| rel == relation)
            .map(|(_, tuple)| tuple.clone())
            .collect();

        Ok(tuples)
    }

    async fn find_by_object(
        &self,
        namespace: &str,
        object_id: &str,
    ) -> StoreResult<Vec<RelationTuple>> {
        self.metrics.record_read();
        let data = self.data.read().await;

        let object_key = (namespace.to_string(), object_id.to_string());
        Ok(data
            .object_permissions
            .get(&object_key)
            .map(|partition| partition.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn find_memberships(&self, subject: &Subject) -> StoreResult<Vec<RelationTuple>> {
        self.metrics.record_read();
        let data = self.data.read().await;

        Ok(data
            .by_subject
            .get(&subject.to_parts())
            .map(|partition| partition.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn find_by_relation(
        &self,
        namespace: &str,
        relation: &str,
    ) -> StoreResult<Vec<RelationTuple>> {
        self.metrics.record_read();
        let data = self.data.read().await;

        let relation_key = (namespace.to_string(), relation.to_string());
        Ok(data
            .by_relation
            .get(&relation_key)
            .map(|partition| partition.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn recent_changes(&self, limit: usize) -> StoreResult<Vec<ChangeRecord>> {
        let data = self.data.read().await;
        let skip = data.change_log.len().saturating_sub(limit);
        Ok(data.change_log.iter().skip(skip).cloned().collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn metrics(&self) -> Option<MetricsSnapshot> {
        Some(self.metrics.snapshot())
    }
}
