//! POST /api/v1/check

use axum::{extract::State, Json};
use tracing::{debug, info};

use gatekeep_types::{validation::validate_check, CheckRequest, CheckResponse};
use gatekeep_zookie::Zookie;

use crate::{with_deadline, AppState, Result};

pub async fn check_handler(
    State(state): State<AppState>,
    Json(request): Json<CheckRequest>,
) -> Result<Json<CheckResponse>> {
    let deadline = state.deadline();
    with_deadline(deadline, async move {
        validate_check(&request)?;

        let input_zookie = match request.zookie.as_deref() {
            Some(encoded) => Some(Zookie::decode(encoded)?),
            None => None,
        };

        debug!(check = %request.render(), "check request");

        let stamp = state.zookies.now();
        let allowed = state.checker.check(&request, input_zookie, stamp).await?;

        info!(check = %request.render(), allowed, "check decided");

        Ok(Json(CheckResponse { allowed, zookie: stamp.encode() }))
    })
    .await
}
