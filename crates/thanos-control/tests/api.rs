//! Router-level tests: envelope shape, status codes, end-to-end create
//! over HTTP.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{create_body, Harness};
use thanos_control::api::{self, AppState};
use thanos_control::{StackStatus, Store};

fn app(h: &Harness) -> Router {
    api::router(AppState {
        orchestrator: h.orchestrator.clone(),
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("request");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .body(Body::empty())
        .expect("request")
}

fn post_json(path: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).expect("serialize")))
        .expect("request")
}

#[tokio::test]
async fn health_endpoint() {
    let h = Harness::new().await;
    let app = app(&h);

    let (status, body) = send(&app, get("/api/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 200);
    assert_eq!(body["message"], "Successfully");

    h.orchestrator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn create_stack_end_to_end() {
    let h = Harness::new().await;
    let app = app(&h);

    let (status, body) = send(&app, post_json("/api/v1/stacks/thanos", &create_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 200);
    assert_eq!(body["message"], "Successfully");

    let stack_id = body["data"]["stackId"].as_str().expect("stackId").to_owned();
    // The id is a server-generated UUID.
    assert!(uuid::Uuid::parse_str(&stack_id).is_ok());

    // Status becomes Deployed once the (mocked) SDK calls finish.
    h.wait_until("deployed over http", || async {
        let (_, body) = send(
            &app,
            get(&format!("/api/v1/stacks/thanos/{stack_id}/status")),
        )
        .await;
        body["data"]["status"] == json!("Deployed")
    })
    .await;

    h.wait_until("metadata over http", || async {
        let (_, body) = send(&app, get(&format!("/api/v1/stacks/thanos/{stack_id}"))).await;
        body["data"]["stack"]["metadata"]["bridgeUrl"].is_string()
    })
    .await;

    let (status, body) = send(&app, get(&format!("/api/v1/stacks/thanos/{stack_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    let stack = &body["data"]["stack"];
    assert_eq!(stack["name"], "Thanos");
    assert_eq!(
        stack["metadata"]["bridgeUrl"],
        "https://bridge.thanos.example"
    );

    // Deployments listing.
    let (status, body) = send(
        &app,
        get(&format!("/api/v1/stacks/thanos/{stack_id}/deployments")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let deployments = body["data"]["deployments"].as_array().expect("array");
    assert_eq!(deployments.len(), 2);
    assert_eq!(deployments[0]["step"], 1);
    assert_eq!(deployments[1]["step"], 2);

    // Single deployment and its status.
    let deployment_id = deployments[0]["id"].as_str().expect("id");
    let (status, body) = send(
        &app,
        get(&format!(
            "/api/v1/stacks/thanos/{stack_id}/deployments/{deployment_id}/status"
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "Completed");

    // Active integrations show the completed bridge.
    let (status, body) = send(
        &app,
        get(&format!("/api/v1/stacks/thanos/{stack_id}/integrations")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let integrations = body["data"]["integrations"].as_array().expect("array");
    assert_eq!(integrations.len(), 1);
    assert_eq!(integrations[0]["type"], "bridge");
    assert_eq!(integrations[0]["status"], "Completed");

    h.orchestrator.shutdown().await;
}

#[tokio::test]
async fn create_rejects_local_devnet_without_writing_rows() {
    let h = Harness::new().await;
    let app = app(&h);

    let mut body = create_body();
    body["network"] = json!("LocalDevnet");

    let (status, response) = send(&app, post_json("/api/v1/stacks/thanos", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["status"], 400);
    assert_eq!(response["message"], "local devnet is not supported yet");
    assert!(response["data"].is_null());

    // No rows were written.
    let (_, listing) = send(&app, get("/api/v1/stacks/thanos")).await;
    assert_eq!(
        listing["data"]["stacks"].as_array().expect("array").len(),
        0
    );

    h.orchestrator.shutdown().await;
}

#[tokio::test]
async fn unknown_stack_is_404() {
    let h = Harness::new().await;
    let app = app(&h);

    let missing = uuid::Uuid::new_v4();
    let (status, body) = send(&app, get(&format!("/api/v1/stacks/thanos/{missing}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
    assert_eq!(body["message"], "Stack not found");

    h.orchestrator.shutdown().await;
}

#[tokio::test]
async fn malformed_stack_id_is_400() {
    let h = Harness::new().await;
    let app = app(&h);

    let (status, body) = send(&app, get("/api/v1/stacks/thanos/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid stack id");

    h.orchestrator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn terminate_guard_over_http() {
    let h = Harness::new().await;
    let app = app(&h);

    h.sdk.script(
        thanos_control::sdk::MockOp::DeployL1Contracts,
        thanos_control::sdk::MockBehaviour::BlockUntilCancelled,
    );

    let (_, body) = send(&app, post_json("/api/v1/stacks/thanos", &create_body())).await;
    let stack_id = body["data"]["stackId"].as_str().expect("stackId").to_owned();

    h.wait_until("deploying", || async {
        let (_, body) = send(
            &app,
            get(&format!("/api/v1/stacks/thanos/{stack_id}/status")),
        )
        .await;
        body["data"]["status"] == json!("Deploying")
    })
    .await;

    let (status, body) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/v1/stacks/thanos/{stack_id}"))
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .expect("message")
        .contains("still deploying"));

    // Stop, then terminate goes through.
    let (status, _) = send(
        &app,
        post_json(
            &format!("/api/v1/stacks/thanos/{stack_id}/stop"),
            &Value::Null,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let parsed = thanos_control::StackId::parse(&stack_id).expect("uuid");
    h.wait_for_stack_status(&parsed, StackStatus::Stopped).await;

    let (status, _) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/v1/stacks/thanos/{stack_id}"))
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    h.wait_for_stack_status(&parsed, StackStatus::Terminated).await;

    h.orchestrator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bridge_conflict_over_http() {
    let h = Harness::new().await;
    let app = app(&h);

    let (_, body) = send(&app, post_json("/api/v1/stacks/thanos", &create_body())).await;
    let stack_id = body["data"]["stackId"].as_str().expect("stackId").to_owned();
    let parsed = thanos_control::StackId::parse(&stack_id).expect("uuid");
    h.wait_for_stack_status(&parsed, StackStatus::Deployed).await;
    h.wait_until("bridge completed", || async {
        h.store
            .get_installed_integration(&parsed, thanos_control::IntegrationType::Bridge)
            .await
            .expect("get")
            .is_some()
    })
    .await;

    let (status, body) = send(
        &app,
        post_json(
            &format!("/api/v1/stacks/thanos/{stack_id}/integrations/bridge"),
            &Value::Null,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "There is already an active bridge");

    h.orchestrator.shutdown().await;
}
