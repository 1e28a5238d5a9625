//! # Gatekeep Types
//!
//! Shared type definitions for the gatekeep authorization engine.
//!
//! This crate provides the domain types used across the workspace, ensuring a
//! single source of truth and preventing circular dependencies between the
//! store, cache, evaluator, and API layers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod subject;
pub mod validation;

pub use subject::{Subject, UsersetRef};

// ============================================================================
// Core Domain Types
// ============================================================================

/// One edge of the authorization graph: object -> (relation) -> subject.
///
/// Tuples are uniquely keyed by (namespace, object_id, relation, subject);
/// `created_at_micros` records insertion time and is never rewound by an
/// idempotent re-insert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationTuple {
    /// Object class (e.g. "document", "team")
    pub namespace: String,
    /// Identifier of the object instance
    pub object_id: String,
    /// Named relation on that class (e.g. "owner")
    pub relation: String,
    /// The subject holding the relation, direct principal or userset
    pub subject: Subject,
    /// Logical insertion timestamp, microsecond resolution
    pub created_at_micros: i64,
}

impl RelationTuple {
    pub fn new(
        namespace: impl Into<String>,
        object_id: impl Into<String>,
        relation: impl Into<String>,
        subject: Subject,
        created_at_micros: i64,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            object_id: object_id.into(),
            relation: relation.into(),
            subject,
            created_at_micros,
        }
    }

    /// The unique key of this tuple, ignoring the insertion timestamp.
    pub fn key(&self) -> TupleKey {
        TupleKey {
            namespace: self.namespace.clone(),
            object_id: self.object_id.clone(),
            relation: self.relation.clone(),
            subject: self.subject.clone(),
        }
    }

    /// Render the tuple in `ns:obj#rel@utype:uid` form for logs and debugging.
    pub fn render(&self) -> String {
        let (user_type, user_id) = self.subject.to_parts();
        format!(
            "{}:{}#{}@{}:{}",
            self.namespace, self.object_id, self.relation, user_type, user_id
        )
    }
}

/// The identity of a tuple without its timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleKey {
    pub namespace: String,
    pub object_id: String,
    pub relation: String,
    pub subject: Subject,
}

/// The two mutation kinds accepted by the Write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    Delete,
}

/// A change emitted by the write path. The store appends one record per
/// applied mutation; consumers beyond the write path are out of scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub operation: Operation,
    pub tuple: RelationTuple,
    pub at_micros: i64,
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend rejected or timed out an operation. Retriable.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// The storage backend is unreachable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache backend failed an operation. Reads degrade to a miss;
    /// failed invalidations must fail the surrounding write.
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors surfaced by the evaluator and the API layer.
///
/// `NotFound` is deliberately absent: a read that targets nothing yields an
/// empty result, and a check that matches nothing yields deny.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("request deadline exceeded")]
    Timeout,
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

// ============================================================================
// Request/Response Types - Check
// ============================================================================

/// A permission check request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckRequest {
    pub namespace: String,
    pub object_id: String,
    pub relation: String,
    pub user_id: String,
    /// Subject category; defaults to "user" when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
    /// Consistency token; entries cached before it are bypassed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zookie: Option<String>,
}

impl CheckRequest {
    pub fn user_type(&self) -> &str {
        self.user_type.as_deref().unwrap_or("user")
    }

    /// Render the request in `ns:obj#rel@utype:uid` form.
    pub fn render(&self) -> String {
        format!(
            "{}:{}#{}@{}:{}",
            self.namespace,
            self.object_id,
            self.relation,
            self.user_type(),
            self.user_id
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub zookie: String,
}

// ============================================================================
// Request/Response Types - Write
// ============================================================================

/// A tuple as it appears on the wire, with the subject flattened into the
/// `user_type`/`user_id` string pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleSpec {
    pub namespace: String,
    pub object_id: String,
    pub relation: String,
    #[serde(default = "default_user_type")]
    pub user_type: String,
    pub user_id: String,
}

fn default_user_type() -> String {
    "user".to_string()
}

/// A single mutation in a Write batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TupleUpdate {
    pub operation: Operation,
    pub tuple: TupleSpec,
}

/// What a precondition requires of the pre-batch store state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    Exists,
    Absent,
}

/// A guard evaluated against the store before any update in the batch
/// applies. An unmet precondition fails the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Precondition {
    pub require: Requirement,
    pub tuple: TupleSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    pub updates: Vec<TupleUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preconditions: Option<Vec<Precondition>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResponse {
    pub zookie: String,
}

// ============================================================================
// Request/Response Types - Read
// ============================================================================

/// A filter over the five tuple fields. Any subset may be populated; the
/// most selective populated prefix picks the index that serves the read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TupleFilter {
    pub namespace: Option<String>,
    pub object_id: Option<String>,
    pub relation: Option<String>,
    pub user_type: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadRequest {
    pub tuple_filter: TupleFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zookie: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

/// A tuple rendered for API responses, with a human-readable timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiTuple {
    pub namespace: String,
    pub object_id: String,
    pub relation: String,
    pub user_type: String,
    pub user_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&RelationTuple> for ApiTuple {
    fn from(tuple: &RelationTuple) -> Self {
        let (user_type, user_id) = tuple.subject.to_parts();
        Self {
            namespace: tuple.namespace.clone(),
            object_id: tuple.object_id.clone(),
            relation: tuple.relation.clone(),
            user_type,
            user_id,
            created_at: chrono::DateTime::from_timestamp_micros(tuple.created_at_micros)
                .unwrap_or_else(chrono::Utc::now),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResponse {
    pub tuples: Vec<ApiTuple>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    pub zookie: String,
}

// ============================================================================
// Request/Response Types - BatchCheck
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCheckRequest {
    pub checks: Vec<CheckRequest>,
    /// Shared consistency token applied to every check in the batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zookie: Option<String>,
}

/// The outcome of one check in a batch, tagged with its input position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCheckItem {
    pub request_index: usize,
    pub allowed: bool,
    /// Debug rendering of the request (`ns:obj#rel@utype:uid`)
    pub request_info: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCheckResponse {
    pub results: Vec<BatchCheckItem>,
    pub total_requests: usize,
    pub allowed_count: usize,
    pub denied_count: usize,
    pub zookie: String,
}

impl BatchCheckResponse {
    pub fn new(results: Vec<BatchCheckItem>, zookie: String) -> Self {
        let total_requests = results.len();
        let allowed_count = results.iter().filter(|r| r.allowed).count();
        Self {
            results,
            total_requests,
            allowed_count,
            denied_count: total_requests - allowed_count,
            zookie,
        }
    }
}
