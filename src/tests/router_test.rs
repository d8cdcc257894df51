// Integration tests for the HTTP surface
// Drives the real handlers through the router with in-process requests

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::util::ServiceExt;

use crate::tests::common::{create_test_router, create_test_state};

fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("Failed to build request")
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    serde_json::from_slice(&body).expect("Response body is not JSON")
}

#[tokio::test]
async fn health_reports_component_flags() {
    let ctx = create_test_state();
    let app = create_test_router(ctx.state.clone());

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("Failed to build request");
    let response = app.oneshot(request).await.expect("Failed to make request");

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["agent_initialized"], true);
    assert_eq!(body["voice_initialized"], false);
}

#[tokio::test]
async fn merged_chat_returns_ordered_events() {
    let ctx = create_test_state();
    let app = create_test_router(ctx.state.clone());

    let request = json_request(
        "/api/chat",
        serde_json::json!({
            "message": "What are the top service categories?",
            "mode": "deep_analysis"
        }),
    );
    let response = app.oneshot(request).await.expect("Failed to make request");

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let types: Vec<&str> = body["events"]
        .as_array()
        .expect("events must be an array")
        .iter()
        .map(|e| e["type"].as_str().unwrap_or(""))
        .collect();
    assert_eq!(
        types,
        vec!["user", "thought", "plan", "thought", "navigation", "thought", "answer", "complete"]
    );
}

#[tokio::test]
async fn cluster_predict_returns_consistent_pair() {
    let ctx = create_test_state();
    let app = create_test_router(ctx.state.clone());

    let request = json_request(
        "/api/cluster/predict",
        serde_json::json!({ "message": "broken streetlights near King Street" }),
    );
    let response = app.oneshot(request).await.expect("Failed to make request");

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["parent_cluster_id"], 1);
    assert_eq!(body["child_cluster_id"], 10);
    let confidence = body["confidence"].as_f64().expect("confidence must be a number");
    assert!(confidence > 0.0 && confidence <= 1.0);
}

#[tokio::test]
async fn analytics_visit_rejects_unknown_cluster_pair() {
    let ctx = create_test_state();
    let app = create_test_router(ctx.state.clone());

    let request = json_request(
        "/api/chat/analytics-visit",
        serde_json::json!({ "parent_cluster_id": 1, "child_cluster_id": 999 }),
    );
    let response = app.oneshot(request).await.expect("Failed to make request");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response_json(response).await;
    assert_eq!(body["kind"], "UnknownCluster");
}

#[tokio::test]
async fn analytics_visit_returns_route_and_discussion() {
    let ctx = create_test_state();
    let app = create_test_router(ctx.state.clone());

    let request = json_request(
        "/api/chat/analytics-visit",
        serde_json::json!({ "parent_cluster_id": 1, "child_cluster_id": 10 }),
    );
    let response = app.oneshot(request).await.expect("Failed to make request");

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["url"], "/backlog");
    assert_eq!(body["discussion"], "stub reply");
}

#[tokio::test]
async fn voice_endpoints_answer_503_without_credential() {
    let ctx = create_test_state();
    let app = create_test_router(ctx.state.clone());

    let request = json_request(
        "/api/voice/tts",
        serde_json::json!({ "text": "Hello world", "output_format": "wav" }),
    );
    let response = app.oneshot(request).await.expect("Failed to make request");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = response_json(response).await;
    assert_eq!(body["kind"], "VoiceDisabled");
}
