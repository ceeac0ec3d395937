//! REST API集成测试（内存后端）

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use macct_api::{create_app, AppState};
use macct_application::JobService;
use macct_config::DispatchConfig;
use serde_json::{json, Value};
use tower::ServiceExt;

use macct_infrastructure::{
    BroadcastEventNotifier, InMemoryOperationRepository, InMemoryStreamDispatcher,
};

async fn test_app() -> axum::Router {
    let policy = DispatchConfig {
        max_retries: 3,
        claim_min_idle_ms: 0,
        claim_batch: 10,
        claim_consumer: "api-test".to_string(),
        reconcile_interval_seconds: 30,
        reconcile_age_seconds: 60,
    };
    let job_service = Arc::new(JobService::new(
        Arc::new(InMemoryOperationRepository::new()),
        Arc::new(InMemoryStreamDispatcher::new()),
        Arc::new(BroadcastEventNotifier::default()),
        policy,
    ));
    job_service.ensure_infrastructure().await.unwrap();
    create_app(
        AppState {
            job_service,
            metrics_handle: None,
        },
        true,
    )
}

async fn read_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "macctd");
}

#[tokio::test]
async fn test_create_job_returns_created_then_ok_on_duplicate() {
    let app = test_app().await;

    let response = app
        .clone()
        .oneshot(post_json("/api/jobs", json!({"hostname": "pc-01"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["queued"], true);
    // school缺省补默认值
    assert_eq!(body["data"]["operation"]["school"], "default-school");
    let id = body["data"]["operation"]["id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(post_json("/api/jobs", json!({"hostname": "pc-01"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["queued"], false);
    assert_eq!(body["data"]["message"], "Job already queued");
    assert_eq!(body["data"]["operation"]["id"], id.as_str());
}

#[tokio::test]
async fn test_create_job_rejects_blank_hostname() {
    let app = test_app().await;
    let response = app
        .oneshot(post_json("/api/jobs", json!({"hostname": ""})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["error"]["type"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_get_job_not_found() {
    let app = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/jobs/00000000-0000-0000-0000-000000000000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json(response).await;
    assert_eq!(body["error"]["type"], "OPERATION_NOT_FOUND");
}

#[tokio::test]
async fn test_status_update_and_conflict_on_completed() {
    let app = test_app().await;
    let response = app
        .clone()
        .oneshot(post_json("/api/jobs", json!({"hostname": "pc-01"})))
        .await
        .unwrap();
    let body = read_json(response).await;
    let id = body["data"]["operation"]["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/jobs/{id}/status"),
            json!({"status": "completed", "result": {"repaired": true}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["status"], "completed");
    assert!(body["data"]["completed_at"].is_string());

    // 已完成的任务不可再变更
    let response = app
        .oneshot(post_json(
            &format!("/api/jobs/{id}/status"),
            json!({"status": "running"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json(response).await;
    assert_eq!(body["error"]["type"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_status_update_rejects_unknown_status() {
    let app = test_app().await;
    let response = app
        .clone()
        .oneshot(post_json("/api/jobs", json!({"hostname": "pc-01"})))
        .await
        .unwrap();
    let body = read_json(response).await;
    let id = body["data"]["operation"]["id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(post_json(
            &format!("/api/jobs/{id}/status"),
            json!({"status": "exploded"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_retry_until_dlq() {
    let app = test_app().await;
    let response = app
        .clone()
        .oneshot(post_json("/api/jobs", json!({"hostname": "pc-01"})))
        .await
        .unwrap();
    let body = read_json(response).await;
    let id = body["data"]["operation"]["id"].as_str().unwrap().to_string();

    for attempt in 1..=3 {
        let response = app
            .clone()
            .oneshot(post_json(&format!("/api/jobs/{id}/retry"), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["data"]["success"], true);
        assert_eq!(body["data"]["attempt"], attempt);
    }

    let response = app
        .clone()
        .oneshot(post_json(&format!("/api/jobs/{id}/retry"), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["success"], false);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/jobs/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = read_json(response).await;
    assert_eq!(body["data"]["status"], "failed");
}

#[tokio::test]
async fn test_list_jobs_with_filters() {
    let app = test_app().await;
    for host in ["pc-01", "pc-02", "pc-03"] {
        app.clone()
            .oneshot(post_json(
                "/api/jobs",
                json!({"hostname": host, "school": "north-campus"}),
            ))
            .await
            .unwrap();
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/jobs?school=north-campus&page=1&limit=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["total_pages"], 2);

    // 非法状态过滤报400
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/jobs?status=bogus")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_monitoring_endpoints() {
    let app = test_app().await;
    app.clone()
        .oneshot(post_json("/api/jobs", json!({"hostname": "pc-01"})))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/monitoring/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["stream"], "macct_repair_jobs");
    assert_eq!(body["data"]["info"]["length"], 1);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/monitoring/pending")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["summary"]["total"], 0);

    let response = app
        .oneshot(post_json("/api/monitoring/claim", json!({"min_idle_ms": 0})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["claimed"], 0);
    assert_eq!(body["data"]["consumer"], "api-test");
}

#[tokio::test]
async fn test_metrics_disabled_returns_404() {
    let app = test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
