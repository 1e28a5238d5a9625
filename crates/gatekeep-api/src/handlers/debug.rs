//! Operational listings used for debugging grants.
//!
//! GET /api/v1/subjects/{user_type}/{user_id}/tuples
//! GET /api/v1/objects/{namespace}/{object_id}/tuples

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use gatekeep_types::{
    validation::{validate_identifier, validate_namespace},
    ApiTuple, Subject,
};

use crate::{with_deadline, AppState, Result};

#[derive(Serialize)]
pub struct SubjectTuplesResponse {
    pub user_type: String,
    pub user_id: String,
    pub tuples: Vec<ApiTuple>,
    pub count: usize,
}

pub async fn subject_tuples_handler(
    State(state): State<AppState>,
    Path((user_type, user_id)): Path<(String, String)>,
) -> Result<Json<SubjectTuplesResponse>> {
    let deadline = state.deadline();
    with_deadline(deadline, async move {
        validate_identifier("user_type", &user_type)?;
        validate_identifier("user_id", &user_id)?;
        let subject = Subject::from_parts(&user_type, &user_id)?;

        let tuples = state.store.find_memberships(&subject).await?;
        let tuples: Vec<ApiTuple> = tuples.iter().map(ApiTuple::from).collect();

        let count = tuples.len();
        Ok(Json(SubjectTuplesResponse { user_type, user_id, tuples, count }))
    })
    .await
}

#[derive(Serialize)]
pub struct ObjectTuplesResponse {
    pub namespace: String,
    pub object_id: String,
    pub tuples: Vec<ApiTuple>,
    pub count: usize,
}

pub async fn object_tuples_handler(
    State(state): State<AppState>,
    Path((namespace, object_id)): Path<(String, String)>,
) -> Result<Json<ObjectTuplesResponse>> {
    let deadline = state.deadline();
    with_deadline(deadline, async move {
        validate_namespace(&namespace)?;
        validate_identifier("object_id", &object_id)?;

        let tuples = state.store.find_by_object(&namespace, &object_id).await?;
        let tuples: Vec<ApiTuple> = tuples.iter().map(ApiTuple::from).collect();

        let count = tuples.len();
        Ok(Json(ObjectTuplesResponse { namespace, object_id, tuples, count }))
    })
    .await
}
