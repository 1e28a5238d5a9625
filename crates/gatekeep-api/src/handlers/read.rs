//! POST /api/v1/read
//!
//! Enumerates tuples by filter. The most selective populated prefix of the
//! filter picks the serving index; remaining populated fields apply as a
//! residual filter over the indexed scan. Filters that hit no index prefix
//! are rejected. Results page by an opaque offset token over a stable
//! ordering.

use axum::{extract::State, Json};
use tracing::debug;

use gatekeep_types::{
    validation::validate_filter, ApiTuple, ReadRequest, ReadResponse, RelationTuple, Subject,
    TupleFilter,
};
use gatekeep_zookie::Zookie;

use crate::{paging, with_deadline, ApiError, AppState, Result};

pub async fn read_handler(
    State(state): State<AppState>,
    Json(request): Json<ReadRequest>,
) -> Result<Json<ReadResponse>> {
    let deadline = state.deadline();
    with_deadline(deadline, async move {
        validate_filter(&request.tuple_filter)?;

        // The zookie is decoded for validity; reads always query the live
        // store, so it demands nothing further here.
        if let Some(encoded) = request.zookie.as_deref() {
            Zookie::decode(encoded)?;
        }

        let mut tuples = scan_by_filter(&state, &request.tuple_filter).await?;
        tuples.retain(|tuple| matches_residual(tuple, &request.tuple_filter));

        // Stable order so paging is deterministic across requests.
        tuples.sort_by_key(|tuple| tuple.render());

        let page_size = paging::effective_page_size(request.page_size);
        let offset = match request.page_token.as_deref() {
            Some(token) => paging::decode_token(token)?,
            None => 0,
        };

        let next_page_token = if offset + page_size < tuples.len() {
            Some(paging::encode_token(offset + page_size))
        } else {
            None
        };

        let page: Vec<ApiTuple> =
            tuples.iter().skip(offset).take(page_size).map(ApiTuple::from).collect();

        debug!(total = tuples.len(), returned = page.len(), offset, "read served");

        Ok(Json(ReadResponse {
            tuples: page,
            next_page_token,
            zookie: state.zookies.now().encode(),
        }))
    })
    .await
}

/// Pick the index for the filter's most selective populated prefix.
async fn scan_by_filter(state: &AppState, filter: &TupleFilter) -> Result<Vec<RelationTuple>> {
    match (&filter.namespace, &filter.object_id, &filter.relation, &filter.user_id) {
        (Some(namespace), Some(object_id), Some(relation), _) => {
            Ok(state.store.find_tuples_for(namespace, object_id, relation).await?)
        },
        (Some(namespace), Some(object_id), None, _) => {
            Ok(state.store.find_by_object(namespace, object_id).await?)
        },
        (Some(namespace), None, Some(relation), _) => {
            Ok(state.store.find_by_relation(namespace, relation).await?)
        },
        (_, _, _, Some(user_id)) => {
            let user_type = filter.user_type.as_deref().unwrap_or("user");
            let subject = Subject::from_parts(user_type, user_id)?;
            Ok(state.store.find_memberships(&subject).await?)
        },
        _ => Err(ApiError::InvalidRequest(
            "filter must populate (namespace, object_id), (namespace, relation), or user_id"
                .to_string(),
        )),
    }
}

/// Apply filter fields the chosen index did not already constrain.
fn matches_residual(tuple: &RelationTuple, filter: &TupleFilter) -> bool {
    if let Some(namespace) = &filter.namespace {
        if &tuple.namespace != namespace {
            return false;
        }
    }
    if let Some(object_id) = &filter.object_id {
        if &tuple.object_id != object_id {
            return false;
        }
    }
    if let Some(relation) = &filter.relation {
        if &tuple.relation != relation {
            return false;
        }
    }

    let (user_type, user_id) = tuple.subject.to_parts();
    if let Some(want_type) = &filter.user_type {
        if &user_type != want_type {
            return false;
        }
    }
    if let Some(want_id) = &filter.user_id {
        if &user_id != want_id {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeep_types::Subject;

    fn tuple(relation: &str, subject: Subject) -> RelationTuple {
        RelationTuple::new("document", "d1", relation, subject, 1)
    }

    #[test]
    fn test_residual_filters_subject_fields() {
        let filter = TupleFilter {
            namespace: Some("document".to_string()),
            object_id: Some("d1".to_string()),
            user_id: Some("alice".to_string()),
            ..Default::default()
        };

        assert!(matches_residual(&tuple("viewer", Subject::direct("user", "alice")), &filter));
        assert!(!matches_residual(&tuple("viewer", Subject::direct("user", "bob")), &filter));
    }

    #[test]
    fn test_residual_matches_userset_canonical_form() {
        let filter = TupleFilter {
            namespace: Some("document".to_string()),
            user_type: Some("userset".to_string()),
            ..Default::default()
        };

        assert!(matches_residual(
            &tuple("editor", Subject::userset("team", "t1", "member")),
            &filter
        ));
        assert!(!matches_residual(&tuple("editor", Subject::direct("user", "alice")), &filter));
    }
}
