//! POST /api/v1/write
//!
//! Applies a batch of inserts and deletes in submitted order. Preconditions
//! are evaluated against the pre-batch store state, all-or-nothing, before
//! the first update applies. A per-update failure fails the batch; effects
//! already applied persist (there is no cross-update rollback). Cache
//! invalidation runs as a post-step and its failure fails the write, since
//! a stale positive surviving a revoke is worse than a retried write.

use axum::{extract::State, Json};
use tracing::{info, warn};

use gatekeep_cache::purge_for_mutation;
use gatekeep_types::{
    validation::validate_tuple_spec, Operation, Precondition, RelationTuple, Requirement,
    WriteRequest, WriteResponse,
};

use crate::{with_deadline, ApiError, AppState, Result};

pub async fn write_handler(
    State(state): State<AppState>,
    Json(request): Json<WriteRequest>,
) -> Result<Json<WriteResponse>> {
    let deadline = state.deadline();
    with_deadline(deadline, async move {
        if request.updates.is_empty() {
            return Err(ApiError::InvalidRequest("updates must not be empty".to_string()));
        }

        // Validate the whole batch before touching the store.
        let mut tuples = Vec::with_capacity(request.updates.len());
        for update in &request.updates {
            let subject = validate_tuple_spec(&update.tuple)?;
            let created_at = state.zookies.now().timestamp_micros;
            tuples.push((
                update.operation,
                RelationTuple::new(
                    update.tuple.namespace.clone(),
                    update.tuple.object_id.clone(),
                    update.tuple.relation.clone(),
                    subject,
                    created_at,
                ),
            ));
        }

        if let Some(preconditions) = &request.preconditions {
            check_preconditions(&state, preconditions).await?;
        }

        for (operation, tuple) in &tuples {
            match operation {
                Operation::Insert => {
                    info!(tuple = %tuple.render(), "inserting tuple");
                    state.store.insert(tuple).await?;
                },
                Operation::Delete => {
                    info!(tuple = %tuple.render(), "deleting tuple");
                    state.store.delete(tuple).await?;
                },
            }
        }

        if let Some(cache) = &state.cache {
            for (_, tuple) in &tuples {
                if let Err(e) = purge_for_mutation(cache.as_ref(), tuple).await {
                    warn!(tuple = %tuple.render(), error = %e, "cache invalidation failed");
                    return Err(e.into());
                }
            }
        }

        // Stamped after the last update, so a check carrying this zookie
        // reflects the whole batch.
        let zookie = state.zookies.now();
        info!(updates = tuples.len(), zookie = %zookie, "write batch applied");

        Ok(Json(WriteResponse { zookie: zookie.encode() }))
    })
    .await
}

async fn check_preconditions(state: &AppState, preconditions: &[Precondition]) -> Result<()> {
    for precondition in preconditions {
        let subject = validate_tuple_spec(&precondition.tuple)?;
        let tuple = &precondition.tuple;

        let exists = state
            .store
            .find_direct(&tuple.namespace, &tuple.object_id, &tuple.relation, &subject)
            .await?;

        let rendered = format!(
            "{}:{}#{}@{}:{}",
            tuple.namespace, tuple.object_id, tuple.relation, tuple.user_type, tuple.user_id
        );

        match precondition.require {
            Requirement::Exists if !exists => {
                return Err(ApiError::PreconditionFailed(format!(
                    "required tuple {} does not exist",
                    rendered
                )));
            },
            Requirement::Absent if exists => {
                return Err(ApiError::PreconditionFailed(format!(
                    "forbidden tuple {} exists",
                    rendered
                )));
            },
            _ => {},
        }
    }
    Ok(())
}
