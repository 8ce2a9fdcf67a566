mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::*;
use creator_sync::model::SyncStatus;
use creator_sync::server::router;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let pool = setup_pool().await;
    let app = router(service(pool, &FakeProvider::default(), None, test_config()));
    let (status, body) = call(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn background_sync_round_trip_over_http() {
    let pool = setup_pool().await;
    let provider = FakeProvider::default();
    provider
        .put_dataset("ds-posts", vec![raw_post("P1", 1), raw_post("P2", 2)])
        .await;
    provider
        .put_dataset(
            "ds-highlights",
            vec![raw_highlight("17934390166227766", "Tokyo")],
        )
        .await;
    let app = router(service(pool, &provider, None, test_config()));

    let (status, body) = call(
        &app,
        post_json(
            "/creators",
            json!({ "displayName": "Jane", "handle": "@travel_jane" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["creator"]["handle"], "travel_jane");
    assert_eq!(body["creator"]["syncStatus"], "idle");
    let owner = body["creator"]["id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app,
        post_json(
            "/sync/background",
            json!({ "ownerId": owner, "target": "travel_jane" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);
    assert_eq!(body["postsJobId"], "run-1");
    assert_eq!(body["highlightsJobId"], "run-2");

    // Unauthorized delivery.
    let (status, body) = call(
        &app,
        post_json(
            "/webhooks/sync?secret=nope",
            json!({ "creator_id": owner, "sync_type": "posts", "run_id": "run-1", "dataset_id": "ds-posts" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let req = Request::post("/webhooks/sync")
        .header("content-type", "application/json")
        .header("X-Webhook-Secret", SECRET)
        .body(Body::from(
            json!({ "creator_id": owner, "sync_type": "posts", "run_id": "run-1", "dataset_id": "ds-posts" })
                .to_string(),
        ))
        .unwrap();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["savedCount"], 2);

    let (status, _) = call(
        &app,
        post_json(
            &format!("/webhooks/sync?secret={}", SECRET),
            json!({ "creator_id": owner, "sync_type": "highlights", "run_id": "run-2", "dataset_id": "ds-highlights" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, get(&format!("/creators/{}", owner))).await;
    assert_eq!(status, StatusCode::OK);
    let sync_status: SyncStatus =
        serde_json::from_value(body["creator"]["syncStatus"].clone()).unwrap();
    assert_eq!(sync_status, SyncStatus::Completed);

    let (_, body) = call(
        &app,
        get(&format!("/creators/{}/posts?dateTo=2024-05-01", owner)),
    )
    .await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["posts"][0]["externalId"], "P1");
    assert_eq!(body["posts"][0]["kind"], "post");

    let (_, body) = call(&app, get(&format!("/creators/{}/highlights", owner))).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["highlights"][0]["storiesCount"], 4);
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let pool = setup_pool().await;
    let provider = FakeProvider::default();
    let app = router(service(pool, &provider, None, test_config()));

    let (status, body) = call(
        &app,
        post_json("/sync/start", json!({ "ownerId": "c-1", "target": "https://www.instagram.com/explore/" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = call(
        &app,
        post_json("/sync/start", json!({ "ownerId": "c-1", "target": "jane", "kind": "reels" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &app,
        post_json("/sync/status", json!({ "jobId": "run-404", "ownerId": "c-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("404"));

    let req = Request::post("/webhooks/sync")
        .header("X-Webhook-Secret", SECRET)
        .body(Body::from("not json"))
        .unwrap();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&app, get("/creators/not-a-uuid/posts")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);

    let (status, _) = call(&app, get("/creators/not-a-uuid")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pull_sync_over_http() {
    let pool = setup_pool().await;
    let provider = FakeProvider::default();
    let app = router(service(pool, &provider, None, test_config()));
    let owner = "6f1c2a1e-1d44-4a55-9a43-8f0f6b2d7c11";

    let (status, body) = call(
        &app,
        post_json("/sync/start", json!({ "ownerId": owner, "target": "travel_jane", "kind": "posts" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app,
        post_json("/sync/status", json!({ "jobId": job_id, "ownerId": owner })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "processing");

    provider
        .finish(
            &job_id,
            creator_sync::model::JobState::Succeeded,
            vec![raw_post("X1", 3)],
        )
        .await;
    let (_, body) = call(
        &app,
        post_json("/sync/status", json!({ "jobId": job_id, "ownerId": owner })),
    )
    .await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["savedCount"], 1);
    assert_eq!(body["items"][0]["externalId"], "X1");
}
