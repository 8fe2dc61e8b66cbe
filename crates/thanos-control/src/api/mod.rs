//! HTTP API for the control service.
//!
//! Every handler validates its inputs, calls one orchestrator method and
//! wraps the result in the uniform envelope `{status, message, data}`,
//! rendered with its embedded HTTP status code.

mod integrations;
mod stacks;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::error::ServiceError;
use crate::orchestrator::StackOrchestrator;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The stack orchestrator.
    pub orchestrator: Arc<StackOrchestrator>,
}

/// Uniform response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    /// HTTP status code, embedded in the body as well.
    pub status: u16,
    /// Human-readable outcome.
    pub message: String,
    /// Payload, if any.
    pub data: Option<Value>,
}

impl ApiResponse {
    /// Successful response.
    #[must_use]
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            status: 200,
            message: "Successfully".to_owned(),
            data,
        }
    }

    /// Render a service error. Internal failures are logged and masked;
    /// validation and guard rejections carry their message through.
    #[must_use]
    pub fn from_error(error: &ServiceError) -> Self {
        let status = error.status_code();
        let message = if status == 500 {
            error!(error = %error, "request failed");
            "Internal server error".to_owned()
        } else {
            error.to_string()
        };
        Self {
            status,
            message,
            data: None,
        }
    }

    /// Bad-request response with a literal message.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: 400,
            message: message.into(),
            data: None,
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Convert an orchestrator result into the envelope.
pub(crate) fn respond<T, F>(result: Result<T, ServiceError>, data: F) -> ApiResponse
where
    F: FnOnce(T) -> Option<Value>,
{
    match result {
        Ok(value) => ApiResponse::ok(data(value)),
        Err(e) => ApiResponse::from_error(&e),
    }
}

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/health", get(health))
        .route(
            "/stacks/thanos",
            post(stacks::create_stack).get(stacks::get_all_stacks),
        )
        .route(
            "/stacks/thanos/{id}",
            get(stacks::get_stack)
                .put(stacks::update_network)
                .delete(stacks::terminate_stack),
        )
        .route("/stacks/thanos/{id}/resume", post(stacks::resume_stack))
        .route("/stacks/thanos/{id}/stop", post(stacks::stop_stack))
        .route("/stacks/thanos/{id}/status", get(stacks::get_stack_status))
        .route(
            "/stacks/thanos/{id}/deployments",
            get(stacks::get_deployments),
        )
        .route(
            "/stacks/thanos/{id}/deployments/{deployment_id}",
            get(stacks::get_deployment),
        )
        .route(
            "/stacks/thanos/{id}/deployments/{deployment_id}/status",
            get(stacks::get_deployment_status),
        )
        .route(
            "/stacks/thanos/{id}/integrations",
            get(integrations::get_integrations),
        )
        .route(
            "/stacks/thanos/{id}/integrations/{integration_id}",
            get(integrations::get_integration),
        )
        .route(
            "/stacks/thanos/{id}/integrations/bridge",
            post(integrations::install_bridge).delete(integrations::uninstall_bridge),
        )
        .route(
            "/stacks/thanos/{id}/integrations/block-explorer",
            post(integrations::install_block_explorer)
                .delete(integrations::uninstall_block_explorer),
        )
        .route(
            "/stacks/thanos/{id}/integrations/monitoring",
            post(integrations::install_monitoring).delete(integrations::uninstall_monitoring),
        )
        .route(
            "/stacks/thanos/{id}/integrations/candidate-registry",
            post(integrations::register_candidate),
        );

    Router::new().nest("/api/v1", v1).with_state(state)
}

/// Liveness check.
async fn health() -> ApiResponse {
    ApiResponse::ok(Some(serde_json::json!({ "healthy": true })))
}

/// Parse a stack id path segment.
pub(crate) fn parse_stack_id(id: &str) -> Result<crate::types::StackId, ApiResponse> {
    crate::types::StackId::parse(id).map_err(|_| ApiResponse::bad_request("Invalid stack id"))
}
