//! POST /api/v1/batch_check
//!
//! Decides many checks in one request. Identical entries are deduplicated
//! before dispatch and evaluated once; unique checks fan out concurrently
//! under a bounded set, and the result vector is reassembled in input
//! order. One failing check fails the batch, because a partial answer
//! vector cannot be attributed to its questions.

use std::collections::HashMap;

use axum::{extract::State, Json};
use tokio::task::JoinSet;
use tracing::{debug, info};

use gatekeep_types::{
    validation::validate_check, BatchCheckItem, BatchCheckRequest, BatchCheckResponse,
    CheckRequest, EngineResult, Subject,
};
use gatekeep_zookie::Zookie;

use crate::{with_deadline, ApiError, AppState, Result};

/// Dedup identity of one check: the canonical question plus its effective
/// freshness demand.
type DedupKey = (String, String, String, String, String, Option<i64>);

pub async fn batch_check_handler(
    State(state): State<AppState>,
    Json(request): Json<BatchCheckRequest>,
) -> Result<Json<BatchCheckResponse>> {
    let deadline = state.deadline();
    with_deadline(deadline, async move {
        let shared_zookie = match request.zookie.as_deref() {
            Some(encoded) => Some(Zookie::decode(encoded)?),
            None => None,
        };

        // Validate everything up front and collapse duplicates.
        let mut unique: Vec<(CheckRequest, Option<Zookie>)> = Vec::new();
        let mut seen: HashMap<DedupKey, usize> = HashMap::new();
        let mut slot_of: Vec<usize> = Vec::with_capacity(request.checks.len());

        for check in &request.checks {
            validate_check(check)?;

            let input_zookie = match check.zookie.as_deref() {
                Some(encoded) => Some(Zookie::decode(encoded)?),
                None => shared_zookie,
            };

            let subject = Subject::from_parts(check.user_type(), &check.user_id)?;
            let (user_type, user_id) = subject.to_parts();
            let key = (
                check.namespace.clone(),
                check.object_id.clone(),
                check.relation.clone(),
                user_type,
                user_id,
                input_zookie.map(|z| z.timestamp_micros),
            );

            let slot = *seen.entry(key).or_insert_with(|| {
                unique.push((check.clone(), input_zookie));
                unique.len() - 1
            });
            slot_of.push(slot);
        }

        debug!(
            requested = request.checks.len(),
            unique = unique.len(),
            "batch check deduplicated"
        );

        let stamp = state.zookies.now();
        let mut outcomes: Vec<Option<bool>> = vec![None; unique.len()];
        let mut dispatched: JoinSet<(usize, EngineResult<bool>)> = JoinSet::new();
        let parallelism = state.config.check.batch_parallelism.max(1);

        for (slot, (check, input_zookie)) in unique.iter().enumerate() {
            let checker = state.checker.clone();
            let check = check.clone();
            let input_zookie = *input_zookie;

            dispatched.spawn(async move {
                let outcome = checker.check(&check, input_zookie, stamp).await;
                (slot, outcome)
            });

            if dispatched.len() >= parallelism {
                if let Some(joined) = dispatched.join_next().await {
                    record_outcome(joined, &mut outcomes, &mut dispatched).await?;
                }
            }
        }

        while let Some(joined) = dispatched.join_next().await {
            record_outcome(joined, &mut outcomes, &mut dispatched).await?;
        }

        let mut results = Vec::with_capacity(request.checks.len());
        for (index, check) in request.checks.iter().enumerate() {
            let allowed = outcomes[slot_of[index]]
                .ok_or_else(|| ApiError::Storage("batch outcome missing".to_string()))?;
            results.push(BatchCheckItem {
                request_index: index,
                allowed,
                request_info: check.render(),
            });
        }

        let response = BatchCheckResponse::new(results, stamp.encode());
        info!(
            total = response.total_requests,
            allowed = response.allowed_count,
            denied = response.denied_count,
            "batch check decided"
        );

        Ok(Json(response))
    })
    .await
}

async fn record_outcome(
    joined: std::result::Result<(usize, EngineResult<bool>), tokio::task::JoinError>,
    outcomes: &mut [Option<bool>],
    dispatched: &mut JoinSet<(usize, EngineResult<bool>)>,
) -> Result<()> {
    match joined {
        Ok((slot, Ok(allowed))) => {
            outcomes[slot] = Some(allowed);
            Ok(())
        },
        Ok((_, Err(e))) => {
            dispatched.shutdown().await;
            Err(e.into())
        },
        Err(e) => {
            dispatched.shutdown().await;
            Err(ApiError::Storage(format!("batch task failed: {}", e)))
        },
    }
}
