//! Integration endpoints.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;

use crate::dto::{InstallBlockExplorerRequest, InstallMonitoringRequest, RegisterCandidateRequest};
use crate::types::IntegrationId;

use super::{parse_stack_id, respond, ApiResponse, AppState};

/// `GET /stacks/thanos/{id}/integrations` — list active integrations.
pub async fn get_integrations(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResponse {
    let stack_id = match parse_stack_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    respond(
        state.orchestrator.get_integrations(&stack_id).await,
        |integrations| Some(json!({ "integrations": integrations })),
    )
}

/// `GET /stacks/thanos/{id}/integrations/{integration_id}`.
pub async fn get_integration(
    State(state): State<AppState>,
    Path((id, integration_id)): Path<(String, String)>,
) -> ApiResponse {
    if let Err(response) = parse_stack_id(&id) {
        return response;
    }
    let Ok(integration_id) = IntegrationId::parse(&integration_id) else {
        return ApiResponse::bad_request("Invalid integration id");
    };
    respond(
        state.orchestrator.get_integration(&integration_id).await,
        |integration| Some(json!({ "integration": integration })),
    )
}

/// `POST /stacks/thanos/{id}/integrations/bridge`.
pub async fn install_bridge(State(state): State<AppState>, Path(id): Path<String>) -> ApiResponse {
    let stack_id = match parse_stack_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    respond(state.orchestrator.install_bridge(&stack_id).await, |()| None)
}

/// `DELETE /stacks/thanos/{id}/integrations/bridge`.
pub async fn uninstall_bridge(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResponse {
    let stack_id = match parse_stack_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    respond(state.orchestrator.uninstall_bridge(&stack_id).await, |()| {
        None
    })
}

/// `POST /stacks/thanos/{id}/integrations/block-explorer`.
pub async fn install_block_explorer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<InstallBlockExplorerRequest>,
) -> ApiResponse {
    let stack_id = match parse_stack_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    respond(
        state
            .orchestrator
            .install_block_explorer(&stack_id, request)
            .await,
        |()| None,
    )
}

/// `DELETE /stacks/thanos/{id}/integrations/block-explorer`.
pub async fn uninstall_block_explorer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResponse {
    let stack_id = match parse_stack_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    respond(
        state.orchestrator.uninstall_block_explorer(&stack_id).await,
        |()| None,
    )
}

/// `POST /stacks/thanos/{id}/integrations/monitoring`.
pub async fn install_monitoring(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<InstallMonitoringRequest>,
) -> ApiResponse {
    let stack_id = match parse_stack_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    respond(
        state
            .orchestrator
            .install_monitoring(&stack_id, request)
            .await,
        |()| None,
    )
}

/// `DELETE /stacks/thanos/{id}/integrations/monitoring`.
pub async fn uninstall_monitoring(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResponse {
    let stack_id = match parse_stack_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    respond(
        state.orchestrator.uninstall_monitoring(&stack_id).await,
        |()| None,
    )
}

/// `POST /stacks/thanos/{id}/integrations/candidate-registry`.
pub async fn register_candidate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RegisterCandidateRequest>,
) -> ApiResponse {
    let stack_id = match parse_stack_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    respond(
        state
            .orchestrator
            .register_candidate(&stack_id, request)
            .await,
        |()| None,
    )
}
