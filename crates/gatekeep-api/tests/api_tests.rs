//! End-to-end tests over the HTTP surface with an in-memory backend.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use gatekeep_api::{create_router, AppState};
use gatekeep_cache::{DecisionCache, MokaCache};
use gatekeep_config::Config;
use gatekeep_core::{Checker, CheckerConfig};
use gatekeep_store::{MemoryBackend, TupleStore};
use gatekeep_zookie::Zookie;

fn test_state() -> AppState {
    let store: Arc<dyn TupleStore> = Arc::new(MemoryBackend::new());
    let cache: Arc<dyn DecisionCache> = Arc::new(MokaCache::with_defaults());
    let checker = Arc::new(Checker::new(
        Arc::clone(&store),
        Some(Arc::clone(&cache)),
        CheckerConfig::default(),
    ));
    AppState::new(store, Some(cache), checker, Arc::new(Config::default()))
}

fn test_app() -> Router {
    create_router(test_state())
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// Insert one tuple through the public Write operation, returning the zookie.
async fn write_tuple(app: &Router, ns: &str, obj: &str, rel: &str, ut: &str, uid: &str) -> String {
    let (status, body) = post(
        app,
        "/api/v1/write",
        json!({
            "updates": [{
                "operation": "insert",
                "tuple": {
                    "namespace": ns,
                    "object_id": obj,
                    "relation": rel,
                    "user_type": ut,
                    "user_id": uid
                }
            }]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "write failed: {}", body);
    body["zookie"].as_str().unwrap().to_string()
}

async fn check(app: &Router, ns: &str, obj: &str, rel: &str, uid: &str) -> bool {
    let (status, body) = post(
        app,
        "/api/v1/check",
        json!({"namespace": ns, "object_id": obj, "relation": rel, "user_id": uid}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "check failed: {}", body);
    body["allowed"].as_bool().unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "ok");
}

#[tokio::test]
async fn test_check_rejects_empty_fields() {
    let app = test_app();
    let (status, body) = post(
        &app,
        "/api/v1/check",
        json!({"namespace": "", "object_id": "d1", "relation": "viewer", "user_id": "alice"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation error");
}

#[tokio::test]
async fn test_check_rejects_undecodable_zookie() {
    let app = test_app();
    let (status, _) = post(
        &app,
        "/api/v1/check",
        json!({
            "namespace": "document",
            "object_id": "d1",
            "relation": "viewer",
            "user_id": "alice",
            "zookie": "not-a-zookie"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_check_unknown_tuple_denies_with_zookie() {
    let app = test_app();
    let (status, body) = post(
        &app,
        "/api/v1/check",
        json!({"namespace": "document", "object_id": "ghost", "relation": "viewer", "user_id": "alice"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], false);
    // The response zookie must decode.
    Zookie::decode(body["zookie"].as_str().unwrap()).unwrap();
}

#[tokio::test]
async fn test_owner_grant_satisfies_viewer_check() {
    let app = test_app();
    write_tuple(&app, "document", "d1", "owner", "user", "alice").await;

    assert!(check(&app, "document", "d1", "viewer", "alice").await);
    assert!(check(&app, "document", "d1", "editor", "alice").await);
    assert!(!check(&app, "document", "d1", "owner", "bob").await);
}

#[tokio::test]
async fn test_userset_membership_grants_access() {
    let app = test_app();
    write_tuple(&app, "team", "t1", "member", "user", "bob").await;
    write_tuple(&app, "document", "d2", "editor", "userset", "team:t1#member").await;

    assert!(check(&app, "document", "d2", "editor", "bob").await);
    assert!(!check(&app, "document", "d2", "editor", "mallory").await);
}

#[tokio::test]
async fn test_userset_membership_combined_with_inheritance() {
    let app = test_app();
    write_tuple(&app, "team", "t1", "member", "user", "bob").await;
    write_tuple(&app, "document", "d2", "editor", "userset", "team:t1#member").await;

    // editor via the team, viewer via the hierarchy below editor.
    assert!(check(&app, "document", "d2", "viewer", "bob").await);
}

#[tokio::test]
async fn test_revoke_visible_through_returned_zookie() {
    let app = test_app();
    write_tuple(&app, "document", "d3", "viewer", "user", "carol").await;

    // Warm the cache with the pre-revocation decision.
    assert!(check(&app, "document", "d3", "viewer", "carol").await);

    let (status, body) = post(
        &app,
        "/api/v1/write",
        json!({
            "updates": [{
                "operation": "delete",
                "tuple": {
                    "namespace": "document",
                    "object_id": "d3",
                    "relation": "viewer",
                    "user_id": "carol"
                }
            }]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let revoke_zookie = body["zookie"].as_str().unwrap();

    // A check carrying the revoke's zookie must reflect the revoke.
    let (status, body) = post(
        &app,
        "/api/v1/check",
        json!({
            "namespace": "document",
            "object_id": "d3",
            "relation": "viewer",
            "user_id": "carol",
            "zookie": revoke_zookie
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], false);

    // And the invalidation purged the stale entry for zookie-less callers too.
    assert!(!check(&app, "document", "d3", "viewer", "carol").await);
}

#[tokio::test]
async fn test_userset_cycle_denies_and_terminates() {
    let app = test_app();
    write_tuple(&app, "document", "d4", "editor", "userset", "group:g1#member").await;
    write_tuple(&app, "group", "g1", "member", "userset", "group:g2#member").await;
    write_tuple(&app, "group", "g2", "member", "userset", "group:g1#member").await;

    assert!(!check(&app, "document", "d4", "editor", "dave").await);
}

#[tokio::test]
async fn test_batch_check_deduplicates_and_keeps_order() {
    let app = test_app();
    write_tuple(&app, "document", "d1", "owner", "user", "alice").await;

    let (status, body) = post(
        &app,
        "/api/v1/batch_check",
        json!({
            "checks": [
                {"namespace": "document", "object_id": "d1", "relation": "viewer", "user_id": "alice"},
                {"namespace": "document", "object_id": "d1", "relation": "viewer", "user_id": "alice"},
                {"namespace": "document", "object_id": "d1", "relation": "owner", "user_id": "bob"}
            ]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "batch failed: {}", body);

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["request_index"], 0);
    assert_eq!(results[0]["allowed"], true);
    assert_eq!(results[1]["request_index"], 1);
    assert_eq!(results[1]["allowed"], true);
    assert_eq!(results[2]["request_index"], 2);
    assert_eq!(results[2]["allowed"], false);
    assert_eq!(results[2]["request_info"], "document:d1#owner@user:bob");

    assert_eq!(body["total_requests"], 3);
    assert_eq!(body["allowed_count"], 2);
    assert_eq!(body["denied_count"], 1);
}

#[tokio::test]
async fn test_read_by_object_with_paging() {
    let app = test_app();
    write_tuple(&app, "document", "d1", "viewer", "user", "alice").await;
    write_tuple(&app, "document", "d1", "viewer", "user", "bob").await;
    write_tuple(&app, "document", "d1", "owner", "user", "carol").await;

    let (status, body) = post(
        &app,
        "/api/v1/read",
        json!({
            "tuple_filter": {"namespace": "document", "object_id": "d1"},
            "page_size": 2
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tuples"].as_array().unwrap().len(), 2);
    let token = body["next_page_token"].as_str().unwrap().to_string();

    let (status, body) = post(
        &app,
        "/api/v1/read",
        json!({
            "tuple_filter": {"namespace": "document", "object_id": "d1"},
            "page_size": 2,
            "page_token": token
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tuples"].as_array().unwrap().len(), 1);
    assert!(body["next_page_token"].is_null());
}

#[tokio::test]
async fn test_read_by_object_and_relation() {
    let app = test_app();
    write_tuple(&app, "document", "d1", "viewer", "user", "alice").await;
    write_tuple(&app, "document", "d1", "owner", "user", "carol").await;

    let (status, body) = post(
        &app,
        "/api/v1/read",
        json!({
            "tuple_filter": {
                "namespace": "document",
                "object_id": "d1",
                "relation": "viewer"
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let tuples = body["tuples"].as_array().unwrap();
    assert_eq!(tuples.len(), 1);
    assert_eq!(tuples[0]["user_id"], "alice");
}

#[tokio::test]
async fn test_read_by_namespace_and_relation() {
    let app = test_app();
    write_tuple(&app, "document", "d1", "editor", "userset", "team:t1#member").await;
    write_tuple(&app, "document", "d2", "editor", "user", "alice").await;
    write_tuple(&app, "document", "d2", "viewer", "user", "bob").await;

    let (status, body) = post(
        &app,
        "/api/v1/read",
        json!({"tuple_filter": {"namespace": "document", "relation": "editor"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let tuples = body["tuples"].as_array().unwrap();
    assert_eq!(tuples.len(), 2);
    assert!(tuples.iter().all(|t| t["relation"] == "editor"));
}

#[tokio::test]
async fn test_read_by_subject() {
    let app = test_app();
    write_tuple(&app, "document", "d1", "viewer", "user", "alice").await;
    write_tuple(&app, "team", "t9", "member", "user", "alice").await;
    write_tuple(&app, "document", "d1", "viewer", "user", "bob").await;

    let (status, body) = post(
        &app,
        "/api/v1/read",
        json!({"tuple_filter": {"user_id": "alice"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let tuples = body["tuples"].as_array().unwrap();
    assert_eq!(tuples.len(), 2);
    assert!(tuples.iter().all(|t| t["user_id"] == "alice"));
}

#[tokio::test]
async fn test_read_rejects_unindexable_filter() {
    let app = test_app();

    // Only a relation populated: no index prefix covers it.
    let (status, _) = post(
        &app,
        "/api/v1/read",
        json!({"tuple_filter": {"relation": "viewer"}}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&app, "/api/v1/read", json!({"tuple_filter": {}})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_write_rejects_empty_batch() {
    let app = test_app();
    let (status, _) = post(&app, "/api/v1/write", json!({"updates": []})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_write_rejects_malformed_userset() {
    let app = test_app();
    let (status, _) = post(
        &app,
        "/api/v1/write",
        json!({
            "updates": [{
                "operation": "insert",
                "tuple": {
                    "namespace": "document",
                    "object_id": "d1",
                    "relation": "viewer",
                    "user_type": "userset",
                    "user_id": "missing-the-reference"
                }
            }]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_write_applies_updates_in_order() {
    let app = test_app();

    // Insert and delete of the same tuple in one batch: net effect nothing.
    let (status, _) = post(
        &app,
        "/api/v1/write",
        json!({
            "updates": [
                {
                    "operation": "insert",
                    "tuple": {
                        "namespace": "document", "object_id": "d7",
                        "relation": "viewer", "user_id": "erin"
                    }
                },
                {
                    "operation": "delete",
                    "tuple": {
                        "namespace": "document", "object_id": "d7",
                        "relation": "viewer", "user_id": "erin"
                    }
                }
            ]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!check(&app, "document", "d7", "viewer", "erin").await);
}

#[tokio::test]
async fn test_write_precondition_exists() {
    let app = test_app();

    // Blocked while the guard tuple is missing.
    let body = json!({
        "updates": [{
            "operation": "insert",
            "tuple": {
                "namespace": "document", "object_id": "d8",
                "relation": "viewer", "user_id": "frank"
            }
        }],
        "preconditions": [{
            "require": "exists",
            "tuple": {
                "namespace": "document", "object_id": "d8",
                "relation": "owner", "user_id": "grace"
            }
        }]
    });
    let (status, response) = post(&app, "/api/v1/write", body.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "precondition failed");
    assert!(!check(&app, "document", "d8", "viewer", "frank").await);

    // Satisfying the guard lets the same batch through.
    write_tuple(&app, "document", "d8", "owner", "user", "grace").await;
    let (status, _) = post(&app, "/api/v1/write", body).await;
    assert_eq!(status, StatusCode::OK);
    assert!(check(&app, "document", "d8", "viewer", "frank").await);
}

#[tokio::test]
async fn test_write_precondition_absent() {
    let app = test_app();
    write_tuple(&app, "document", "d9", "owner", "user", "heidi").await;

    let (status, _) = post(
        &app,
        "/api/v1/write",
        json!({
            "updates": [{
                "operation": "insert",
                "tuple": {
                    "namespace": "document", "object_id": "d9",
                    "relation": "owner", "user_id": "ivan"
                }
            }],
            "preconditions": [{
                "require": "absent",
                "tuple": {
                    "namespace": "document", "object_id": "d9",
                    "relation": "owner", "user_id": "heidi"
                }
            }]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!check(&app, "document", "d9", "owner", "ivan").await);
}

#[tokio::test]
async fn test_write_zookie_orders_after_previous_responses() {
    let app = test_app();
    let first = write_tuple(&app, "document", "d1", "viewer", "user", "alice").await;
    let second = write_tuple(&app, "document", "d1", "viewer", "user", "bob").await;

    let first = Zookie::decode(&first).unwrap();
    let second = Zookie::decode(&second).unwrap();
    assert!(second.timestamp_micros > first.timestamp_micros);
}

#[tokio::test]
async fn test_subject_debug_listing() {
    let app = test_app();
    write_tuple(&app, "document", "d1", "viewer", "user", "alice").await;
    write_tuple(&app, "team", "t1", "member", "user", "alice").await;

    let (status, body) = get(&app, "/api/v1/subjects/user/alice/tuples").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["user_id"], "alice");
}

#[tokio::test]
async fn test_object_debug_listing() {
    let app = test_app();
    write_tuple(&app, "document", "d1", "viewer", "user", "alice").await;
    write_tuple(&app, "document", "d1", "owner", "user", "bob").await;

    let (status, body) = get(&app, "/api/v1/objects/document/d1/tuples").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["namespace"], "document");
}

#[tokio::test]
async fn test_batch_check_with_shared_zookie() {
    let app = test_app();
    let zookie = write_tuple(&app, "document", "d1", "owner", "user", "alice").await;

    let (status, body) = post(
        &app,
        "/api/v1/batch_check",
        json!({
            "checks": [
                {"namespace": "document", "object_id": "d1", "relation": "viewer", "user_id": "alice"}
            ],
            "zookie": zookie
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["allowed"], true);
}
