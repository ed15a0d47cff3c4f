//! Job API tests against an in-process router.

mod common;

use std::time::Duration;

use axum::http::{header, StatusCode};
use serde_json::{json, Value};

use common::TestFixture;
use dlsync_core::testing::EngineCall;

async fn create_job(fixture: &TestFixture, url: &str) -> Value {
    let response = fixture
        .post("/api/v1/jobs", json!({ "url": url, "title": "Test file" }))
        .await;
    assert_status!(response, StatusCode::CREATED);
    response.body
}

async fn fail_job(fixture: &TestFixture, id: &str) {
    let response = fixture
        .post(
            "/api/v1/events",
            json!({ "id": id, "status": "failed", "error": "peer went away" }),
        )
        .await;
    assert_status!(response, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/health").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_hides_engine_details() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/config").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["engine_configured"], false);
    assert_eq!(response.body["aggregator"]["debounce_ms"], 100);
    assert!(response.body.get("engine").is_none());
}

#[tokio::test]
async fn test_create_job() {
    let fixture = TestFixture::new().await;
    let job = create_job(&fixture, "https://example.com/file.iso").await;

    assert_eq!(job["status"], "queued");
    assert_eq!(job["url"], "https://example.com/file.iso");
    assert_eq!(job["title"], "Test file");
    assert_eq!(job["retry_count"], 0);

    let started = fixture.engine.calls_of(EngineCall::Start).await;
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].job_id, job["id"].as_str().unwrap());
}

#[tokio::test]
async fn test_create_job_with_empty_url() {
    let fixture = TestFixture::new().await;
    let response = fixture.post("/api/v1/jobs", json!({ "url": "  " })).await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().unwrap().contains("url"));
}

#[tokio::test]
async fn test_create_job_with_malformed_body() {
    let fixture = TestFixture::new().await;
    let response = fixture.post_raw("/api/v1/jobs", "{not json").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_job_engine_rejects() {
    let fixture = TestFixture::new().await;
    fixture.engine.fail_times(1).await;

    let job = create_job(&fixture, "https://example.com/file.iso").await;
    assert_eq!(job["status"], "failed");
    assert!(job["error"].as_str().unwrap().contains("mock engine offline"));
}

#[tokio::test]
async fn test_get_job() {
    let fixture = TestFixture::new().await;
    let job = create_job(&fixture, "https://example.com/a").await;
    let id = job["id"].as_str().unwrap();

    let response = fixture.get(&format!("/api/v1/jobs/{}", id)).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["id"], id);
}

#[tokio::test]
async fn test_get_unknown_job() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/jobs/does-not-exist").await;
    assert_status!(response, StatusCode::NOT_FOUND);
    assert!(response.body["error"].as_str().unwrap().contains("does-not-exist"));
}

#[tokio::test]
async fn test_list_jobs_with_status_filter() {
    let fixture = TestFixture::new().await;
    let first = create_job(&fixture, "https://example.com/a").await;
    create_job(&fixture, "https://example.com/b").await;
    fail_job(&fixture, first["id"].as_str().unwrap()).await;

    let response = fixture.get("/api/v1/jobs").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["total"], 2);
    assert_eq!(response.body["jobs"].as_array().unwrap().len(), 2);

    let response = fixture.get("/api/v1/jobs?status=failed").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["total"], 1);
    assert_eq!(response.body["jobs"][0]["id"], first["id"]);

    let response = fixture.get("/api/v1/jobs?status=exploded").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_job() {
    let fixture = TestFixture::new().await;
    let job = create_job(&fixture, "https://example.com/a").await;
    let path = format!("/api/v1/jobs/{}/cancel", job["id"].as_str().unwrap());

    let response = fixture.post_empty(&path).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "cancelled");
    assert_eq!(fixture.engine.calls_of(EngineCall::Cancel).await.len(), 1);

    // Already terminal
    let response = fixture.post_empty(&path).await;
    assert_status!(response, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_delete_job() {
    let fixture = TestFixture::new().await;
    let job = create_job(&fixture, "https://example.com/a").await;
    let path = format!("/api/v1/jobs/{}", job["id"].as_str().unwrap());

    let response = fixture.delete(&path).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["id"], job["id"]);

    let response = fixture.get(&path).await;
    assert_status!(response, StatusCode::NOT_FOUND);

    let response = fixture.delete(&path).await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_retry_queued_job_is_conflict() {
    let fixture = TestFixture::new().await;
    let job = create_job(&fixture, "https://example.com/a").await;

    let response = fixture
        .post_empty(&format!("/api/v1/jobs/{}/retry", job["id"].as_str().unwrap()))
        .await;
    assert_status!(response, StatusCode::CONFLICT);
    assert!(fixture.engine.calls_of(EngineCall::Retry).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_retry_failed_job() {
    let fixture = TestFixture::new().await;
    let job = create_job(&fixture, "https://example.com/a").await;
    let id = job["id"].as_str().unwrap();
    fail_job(&fixture, id).await;

    fixture.engine.fail_times(1).await;
    let response = fixture.post_empty(&format!("/api/v1/jobs/{}/retry", id)).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "queued");
    assert_eq!(response.body["retry_count"], 2);
    assert!(response.body.get("error").is_none());

    let response = fixture.get(&format!("/api/v1/jobs/{}/retry-stats", id)).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["circuit_breaker_open"], false);
    assert_eq!(response.body["consecutive_failures"], 0);
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhausted_then_circuit_open() {
    let fixture = TestFixture::new().await;
    let job = create_job(&fixture, "https://example.com/a").await;
    let id = job["id"].as_str().unwrap();
    fail_job(&fixture, id).await;
    fixture.engine.set_always_fail(true).await;

    let response = fixture.post_empty(&format!("/api/v1/jobs/{}/retry", id)).await;
    assert_status!(response, StatusCode::BAD_GATEWAY);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("failed after 4 attempts"));

    let job = fixture.get(&format!("/api/v1/jobs/{}", id)).await.body;
    assert_eq!(job["status"], "failed");
    assert!(job["error"]
        .as_str()
        .unwrap()
        .starts_with("Retry failed after 4 attempts"));

    let response = fixture.post_empty(&format!("/api/v1/jobs/{}/retry", id)).await;
    assert_status!(response, StatusCode::SERVICE_UNAVAILABLE);
    let retry_after: u64 = response.headers[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 60);

    let stats = fixture
        .get(&format!("/api/v1/jobs/{}/retry-stats", id))
        .await
        .body;
    assert_eq!(stats["circuit_breaker_open"], true);
    assert_eq!(stats["consecutive_failures"], 4);
    assert!(stats["cooldown_remaining_ms"].as_u64().unwrap() > 0);

    // Cool-down over, engine back
    fixture.engine.set_always_fail(false).await;
    tokio::time::sleep(Duration::from_secs(61)).await;
    let response = fixture.post_empty(&format!("/api/v1/jobs/{}/retry", id)).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "queued");
}

#[tokio::test]
async fn test_retry_stats_unknown_job() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/jobs/nope/retry-stats").await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn test_status_reports_counts_and_persistence() {
    let fixture = TestFixture::new().await;
    let first = create_job(&fixture, "https://example.com/a").await;
    create_job(&fixture, "https://example.com/b").await;
    fail_job(&fixture, first["id"].as_str().unwrap()).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let response = fixture.get("/api/v1/status").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["running"], true);
    assert_eq!(response.body["engine"], "mock");
    assert_eq!(response.body["jobs"], 2);
    assert_eq!(response.body["by_status"]["failed"], 1);
    assert_eq!(response.body["by_status"]["queued"], 1);
    assert_eq!(response.body["dirty"], true);

    tokio::time::sleep(Duration::from_millis(5100)).await;
    let response = fixture.get("/api/v1/status").await;
    assert_eq!(response.body["dirty"], false);
    assert!(response.body["last_saved_at"].is_string());
    assert_eq!(fixture.storage.writes(), 1);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    create_job(&fixture, "https://example.com/a").await;

    let (status, body) = fixture.get_text("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("dlsync_jobs_by_status"));
    assert!(body.contains("dlsync_http_requests_total"));
}
