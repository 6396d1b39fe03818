
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use jobhost::api::router;
use jobhost::job::MemoryJobStore;
use test_harness::{decode_output, TestPipeline};

fn create_test_app() -> (Router, TestPipeline) {
    let pipeline = TestPipeline::new(Arc::new(MemoryJobStore::new()), 100);
    (router(pipeline.service.clone()), pipeline)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = send(
        app,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn submit(app: &Router, command: &str) -> String {
    let (status, body) = send(
        app,
        Request::builder()
            .method("POST")
            .uri("/job")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "cmd_string": command }).to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_slice(&body).unwrap()
}

/// Poll GET /job/:id until status is no longer null
async fn wait_for_completion(app: &Router, job_id: &str) -> Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let (status, job) = get_json(app, &format!("/job/{}", job_id)).await;
        assert_eq!(status, StatusCode::OK);
        if !job["status"].is_null() {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} never completed",
            job_id
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_health_check() {
    let (app, _pipeline) = create_test_app();

    let (status, body) = get_json(&app, "/health_check").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": 1 }));
}

#[tokio::test]
async fn test_list_jobs_empty() {
    let (app, _pipeline) = create_test_app();

    let (status, body) = get_json(&app, "/job").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_submit_echo_hello() {
    let (app, _pipeline) = create_test_app();

    let job_id = submit(&app, "echo hello").await;
    assert!(Uuid::parse_str(&job_id).is_ok());

    let job = wait_for_completion(&app, &job_id).await;
    assert_eq!(job["job_id"], job_id);
    assert_eq!(job["cmd_string"], "echo hello");
    assert_eq!(job["status"], 0);
    assert_eq!(job["output"], "aGVsbG8K");
    assert_eq!(decode_output(job["output"].as_str().unwrap()), "hello\n");
    assert_eq!(job["worker"], "test-worker");
}

#[tokio::test]
async fn test_submit_exit_3() {
    let (app, _pipeline) = create_test_app();

    let job_id = submit(&app, "exit 3").await;
    let job = wait_for_completion(&app, &job_id).await;

    assert_eq!(job["status"], 1);
    assert_eq!(job["output"], "");
}

#[tokio::test]
async fn test_pending_job_is_visible_before_completion() {
    let (app, _pipeline) = create_test_app();

    let job_id = submit(&app, "sleep 0.5; echo done").await;

    let (status, job) = get_json(&app, &format!("/job/{}", job_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(job["status"].is_null());
    assert_eq!(job["output"], "");

    let job = wait_for_completion(&app, &job_id).await;
    assert_eq!(job["status"], 0);
}

#[tokio::test]
async fn test_list_jobs_after_submit() {
    let (app, _pipeline) = create_test_app();

    let first = submit(&app, "echo one").await;
    let second = submit(&app, "echo two").await;
    wait_for_completion(&app, &first).await;
    wait_for_completion(&app, &second).await;

    let (status, body) = get_json(&app, "/job").await;
    assert_eq!(status, StatusCode::OK);
    let jobs = body.as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    let ids: Vec<&str> = jobs.iter().map(|j| j["job_id"].as_str().unwrap()).collect();
    assert!(ids.contains(&first.as_str()));
    assert!(ids.contains(&second.as_str()));
}

#[tokio::test]
async fn test_get_job_invalid_id() {
    let (app, _pipeline) = create_test_app();

    let (status, body) = get_json(&app, "/job/not-a-uuid").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid job id not-a-uuid");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_get_job_not_found() {
    let (app, _pipeline) = create_test_app();

    let (status, body) = get_json(&app, &format!("/job/{}", Uuid::new_v4())).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Error retrieving job with"));
}

#[tokio::test]
async fn test_submit_empty_command_rejected() {
    let (app, pipeline) = create_test_app();

    let (status, _body) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/job")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "cmd_string": "   " }).to_string()))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(pipeline.service.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (app, _pipeline) = create_test_app();

    let (status, body) = send(
        &app,
        Request::builder()
            .uri("/nope")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(String::from_utf8(body).unwrap(), "Not found: /nope");
}

async fn post_job(app: &Router, content_type: Option<&str>, body: &str) -> (StatusCode, Value) {
    let mut builder = Request::builder().method("POST").uri("/job");
    if let Some(content_type) = content_type {
        builder = builder.header("content-type", content_type);
    }
    let (status, body) = send(app, builder.body(Body::from(body.to_string())).unwrap()).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_submit_malformed_body_returns_json_error() {
    let (app, pipeline) = create_test_app();

    let (status, body) = post_job(&app, Some("application/json"), "{not json").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid request body");
    assert!(body["error"].is_string());
    assert!(pipeline.service.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_missing_field_returns_json_error() {
    let (app, _pipeline) = create_test_app();

    let (status, body) = post_job(&app, Some("application/json"), r#"{"cmd":"echo hi"}"#).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "Invalid request body");
    assert!(body["error"].as_str().unwrap().contains("cmd_string"));
}

#[tokio::test]
async fn test_submit_without_content_type_returns_json_error() {
    let (app, _pipeline) = create_test_app();

    let (status, body) = post_job(&app, None, r#"{"cmd_string":"echo hi"}"#).await;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["message"], "Invalid request body");
    assert!(body["error"].is_string());
}
