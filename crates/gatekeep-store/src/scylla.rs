//! ScyllaDB storage backend.
//!
//! Four tables, one per index, mirroring the layout in [`crate::TupleStore`].
//! Scylla offers no transactions across partitions: each index write is its
//! own statement, secondaries go first and the primary table last, so a
//! reader that can see a tuple in the primary can locate it in every
//! secondary. A mid-sequence failure surfaces as a retriable error and
//! leaves the tuple's state undefined for the caller.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use tracing::info;

use gatekeep_types::{ChangeRecord, Operation, RelationTuple, StoreError, StoreResult, Subject};

use crate::TupleStore;

/// Row shape shared by all four index tables.
type TupleRow = (String, String, String, String, String, i64);

fn backend_err(context: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("{}: {}", context, err))
}

fn row_to_tuple(row: TupleRow) -> StoreResult<RelationTuple> {
    let (namespace, object_id, relation, user_type, user_id, created_at_micros) = row;
    let subject = Subject::from_parts(&user_type, &user_id)
        .map_err(|e| StoreError::Backend(format!("stored subject unparseable: {}", e)))?;
    Ok(RelationTuple { namespace, object_id, relation, subject, created_at_micros })
}

/// ScyllaDB-backed tuple store.
pub struct ScyllaBackend {
    session: Arc<Session>,
    keyspace: String,
}

impl ScyllaBackend {
    /// Connect to the cluster and ensure the keyspace and index tables exist.
    pub async fn connect(host: &str, port: u16, keyspace: &str) -> StoreResult<Self> {
        let session = SessionBuilder::new()
            .known_node(format!("{}:{}", host, port))
            .build()
            .await
            .map_err(|e| StoreError::Unavailable(format!("scylla connect failed: {}", e)))?;

        let backend = Self { session: Arc::new(session), keyspace: keyspace.to_string() };
        backend.ensure_schema().await?;
        Ok(backend)
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        let ks = &self.keyspace;

        let create_keyspace = format!(
            "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
             {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
            ks
        );
        self.session
            .query_unpaged(create_keyspace, &[])
            .await
            .map_err(|e| backend_err("create keyspace", e))?;

        let tables = [
            format!(
                "CREATE TABLE IF NOT EXISTS {}.relation_tuples (
                    namespace text, object_id text, relation text,
                    user_type text, user_id text, created_at bigint,
                    PRIMARY KEY ((namespace, object_id), relation, user_type, user_id)
                )",
                ks
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {}.subject_index (
                    user_type text, user_id text, namespace text,
                    object_id text, relation text, created_at bigint,
                    PRIMARY KEY ((user_type, user_id), namespace, object_id, relation)
                )",
                ks
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {}.object_permissions (
                    namespace text, object_id text, relation text,
                    user_type text, user_id text, created_at bigint,
                    PRIMARY KEY ((namespace, object_id), relation, user_type, user_id)
                )",
                ks
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {}.relation_index (
                    namespace text, relation text, object_id text,
                    user_type text, user_id text, created_at bigint,
                    PRIMARY KEY ((namespace, relation), object_id, user_type, user_id)
                )",
                ks
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {}.changelog (
                    bucket int, at_micros bigint, operation text,
                    namespace text, object_id text, relation text,
                    user_type text, user_id text, created_at bigint,
                    PRIMARY KEY ((bucket), at_micros, namespace, object_id, relation, user_type, user_id)
                ) WITH CLUSTERING ORDER BY (at_micros ASC)",
                ks
            ),
        ];

        for ddl in tables {
            self.session.query_unpaged(ddl, &[]).await.map_err(|e| backend_err("create table", e))?;
        }

        info!(keyspace = %ks, "scylla schema ready");
        Ok(())
    }

    async fn select_tuples(
        &self,
        query: String,
        values: impl scylla::serialize::row::SerializeRow,
    ) -> StoreResult<Vec<RelationTuple>> {
        let result = self
            .session
            .query_unpaged(query, values)
            .await
            .map_err(|e| backend_err("select tuples", e))?;

        let rows_result =
            result.into_rows_result().map_err(|e| backend_err("select tuples rows", e))?;

        let mut tuples = Vec::new();
        for row in rows_result.rows::<TupleRow>().map_err(|e| backend_err("select tuples typing", e))? {
            let row = row.map_err(|e| backend_err("select tuples row", e))?;
            tuples.push(row_to_tuple(row)?);
        }
        Ok(tuples)
    }

    async fn append_change(&self, operation: Operation, tuple: &RelationTuple) -> StoreResult<()> {
        let (user_type, user_id) = tuple.subject.to_parts();
        let op = match operation {
            Operation::Insert => "insert",
            Operation::Delete => "delete",
        };
        let query = format!(
            "INSERT INTO {}.changelog \
             (bucket, at_micros, operation, namespace, object_id, relation, user_type, user_id, created_at) \
             VALUES (0, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.keyspace
        );
        self.session
            .query_unpaged(
                query,
                (
                    Utc::now().timestamp_micros(),
                    op,
                    &tuple.namespace,
                    &tuple.object_id,
                    &tuple.relation,
                    &user_type,
                    &user_id,
                    tuple.created_at_micros,
                ),
            )
            .await
            .map_err(|e| backend_err("append changelog", e))?;
        Ok(())
    }
}

#[async_trait]
impl TupleStore for ScyllaBackend {
    async fn insert(&self, tuple: &RelationTuple) -> StoreResult<()> {
        // Probe first so a re-insert keeps the original created_at.
        if self
            .find_direct(&tuple.namespace, &tuple.object_id, &tuple.relation, &tuple.subject)
            .await?
        {
            return Ok(());
        }

        let (user_type, user_id) = tuple.subject.to_parts();

        let subject_index = format!(
            "INSERT INTO {}.subject_index \
             (user_type, user_id, namespace, object_id, relation, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            self.keyspace
        );
        self.session
            .query_unpaged(
                subject_index,
                (
                    &user_type,
                    &user_id,
                    &tuple.namespace,
                    &tuple.object_id,
                    &tuple.relation,
                    tuple.created_at_micros,
                ),
            )
            .await
            .map_err(|e| backend_err("insert subject index", e))?;

        let object_permissions = format!(
            "INSERT INTO {}.object_permissions \
             (namespace, object_id, relation, user_type, user_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            self.keyspace
        );
        self.session
            .query_unpaged(
                object_permissions,
                (
                    &tuple.namespace,
                    &tuple.object_id,
                    &tuple.relation,
                    &user_type,
                    &user_id,
                    tuple.created_at_micros,
                ),
            )
            .await
            .map_err(|e| backend_err("insert object permissions", e))?;

        let relation_index = format!(
            "INSERT INTO {}.relation_index \
             (namespace, relation, object_id, user_type, user_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            self.keyspace
        );
        self.session
            .query_unpaged(
                relation_index,
                (
                    &tuple.namespace,
                    &tuple.relation,
                    &tuple.object_id,
                    &user_type,
                    &user_id,
                    tuple.created_at_micros,
                ),
            )
            .await
            .map_err(|e| backend_err("insert relation index", e))?;

        // Primary table last.
        let primary = format!(
            "INSERT INTO {}.relation_tuples \
             (namespace, object_id, relation, user_type, user_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            self.keyspace
        );
        self.session
            .query_unpaged(
                primary,
                (
                    &tuple.namespace,
                    &tuple.object_id,
                    &tuple.relation,
                    &user_type,
                    &user_id,
                    tuple.created_at_micros,
                ),
            )
            .await
            .map_err(|e| backend_err("insert relation tuple", e))?;

        self.append_change(Operation::Insert, tuple).await
    }

    async fn delete(&self, tuple: &RelationTuple) -> StoreResult<()> {
        let (user_type, user_id) = tuple.subject.to_parts();

        // Primary first on delete, the mirror image of insert ordering.
        let primary = format!(
            "DELETE FROM {}.relation_tuples \
             WHERE namespace = ? AND object_id = ? AND relation = ? \
             AND user_type = ? AND user_id = ?",
            self.keyspace
        );
        self.session
            .query_unpaged(
                primary,
                (&tuple.namespace, &tuple.object_id, &tuple.relation, &user_type, &user_id),
            )
            .await
            .map_err(|e| backend_err("delete relation tuple", e))?;

        let subject_index = format!(
            "DELETE FROM {}.subject_index \
             WHERE user_type = ? AND user_id = ? AND namespace = ? \
             AND object_id = ? AND relation = ?",
            self.keyspace
        );
        self.session
            .query_unpaged(
                subject_index,
                (&user_type, &user_id, &tuple.namespace, &tuple.object_id, &tuple.relation),
            )
            .await
            .map_err(|e| backend_err("delete subject index", e))?;

        let object_permissions = format!(
            "DELETE FROM {}.object_permissions \
             WHERE namespace = ? AND object_id = ? AND relation = ? \
             AND user_type = ? AND user_id = ?",
            self.keyspace
        );
        self.session
            .query_unpaged(
                object_permissions,
                (&tuple.namespace, &tuple.object_id, &tuple.relation, &user_type, &user_id),
            )
            .await
            .map_err(|e| backend_err("delete object permissions", e))?;

        let relation_index = format!(
            "DELETE FROM {}.relation_index \
             WHERE namespace = ? AND relation = ? AND object_id = ? \
             AND user_type = ? AND user_id = ?",
            self.keyspace
        );
        self.session
            .query_unpaged(
                relation_index,
                (&tuple.namespace, &tuple.relation, &tuple.object_id, &user_type, &user_id),
            )
            .await
            .map_err(|e| backend_err("delete relation index", e))?;

        self.append_change(Operation::Delete, tuple).await
    }

    async fn find_direct(
        &self,
        namespace: &str,
        object_id: &str,
        relation: &str,
        subject: &Subject,
    ) -> StoreResult<bool> {
        let (user_type, user_id) = subject.to_parts();
        let query = format!(
            "SELECT namespace, object_id, relation, user_type, user_id, created_at \
             FROM {}.relation_tuples \
             WHERE namespace = ? AND object_id = ? AND relation = ? \
             AND user_type = ? AND user_id = ? LIMIT 1",
            self.keyspace
        );
        let tuples = self
            .select_tuples(query, (namespace, object_id, relation, &user_type, &user_id))
            .await?;
        Ok(!tuples.is_empty())
    }

    async fn find_tuples_for(
        &self,
        namespace: &str,
        object_id: &str,
        relation: &str,
    ) -> StoreResult<Vec<RelationTuple>> {
        let query = format!(
            "SELECT namespace, object_id, relation, user_type, user_id, created_at \
             FROM {}.relation_tuples \
             WHERE namespace = ? AND object_id = ? AND relation = ?",
            self.keyspace
        );
        self.select_tuples(query, (namespace, object_id, relation)).await
    }

    async fn find_by_object(
        &self,
        namespace: &str,
        object_id: &str,
    ) -> StoreResult<Vec<RelationTuple>> {
        let query = format!(
            "SELECT namespace, object_id, relation, user_type, user_id, created_at \
             FROM {}.object_permissions \
             WHERE namespace = ? AND object_id = ?",
            self.keyspace
        );
        self.select_tuples(query, (namespace, object_id)).await
    }

    async fn find_memberships(&self, subject: &Subject) -> StoreResult<Vec<RelationTuple>> {
        let (user_type, user_id) = subject.to_parts();
        let query = format!(
            "SELECT namespace, object_id, relation, user_type, user_id, created_at \
             FROM {}.subject_index \
             WHERE user_type = ? AND user_id = ?",
            self.keyspace
        );

        let result = self
            .session
            .query_unpaged(query, (&user_type, &user_id))
            .await
            .map_err(|e| backend_err("select memberships", e))?;
        let rows_result =
            result.into_rows_result().map_err(|e| backend_err("select memberships rows", e))?;

        // subject_index columns come back in their own order.
        let mut tuples = Vec::new();
        for row in rows_result
            .rows::<(String, String, String, String, String, i64)>()
            .map_err(|e| backend_err("select memberships typing", e))?
        {
            let (user_type, user_id, namespace, object_id, relation, created_at_micros) =
                row.map_err(|e| backend_err("select memberships row", e))?;
            tuples.push(row_to_tuple((
                namespace,
                object_id,
                relation,
                user_type,
                user_id,
                created_at_micros,
            ))?);
        }
        Ok(tuples)
    }

    async fn find_by_relation(
        &self,
        namespace: &str,
        relation: &str,
    ) -> StoreResult<Vec<RelationTuple>> {
        let query = format!(
            "SELECT namespace, object_id, relation, user_type, user_id, created_at \
             FROM {}.relation_index \
             WHERE namespace = ? AND relation = ?",
            self.keyspace
        );
        self.select_tuples(query, (namespace, relation)).await
    }

    async fn recent_changes(&self, limit: usize) -> StoreResult<Vec<ChangeRecord>> {
        let query = format!(
            "SELECT at_micros, operation, namespace, object_id, relation, user_type, user_id, created_at \
             FROM {}.changelog WHERE bucket = 0 LIMIT {}",
            self.keyspace, limit
        );
        let result = self
            .session
            .query_unpaged(query, &[])
            .await
            .map_err(|e| backend_err("select changelog", e))?;
        let rows_result =
            result.into_rows_result().map_err(|e| backend_err("select changelog rows", e))?;

        let mut changes = Vec::new();
        for row in rows_result
            .rows::<(i64, String, String, String, String, String, String, i64)>()
            .map_err(|e| backend_err("select changelog typing", e))?
        {
            let (at_micros, op, namespace, object_id, relation, user_type, user_id, created_at) =
                row.map_err(|e| backend_err("select changelog row", e))?;
            let operation = match op.as_str() {
                "insert" => Operation::Insert,
                _ => Operation::Delete,
            };
            changes.push(ChangeRecord {
                operation,
                tuple: row_to_tuple((namespace, object_id, relation, user_type, user_id, created_at))?,
                at_micros,
            });
        }
        Ok(changes)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.session
            .query_unpaged("SELECT release_version FROM system.local", &[])
            .await
            .map_err(|e| StoreError::Unavailable(format!("scylla ping failed: {}", e)))?;
        Ok(())
    }
}
