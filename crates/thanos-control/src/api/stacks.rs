//! Stack lifecycle endpoints.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;
use tracing::info;

use crate::dto::{CreateStackRequest, UpdateNetworkRequest};
use crate::types::DeploymentId;

use super::{parse_stack_id, respond, ApiResponse, AppState};

/// `POST /stacks/thanos` — create and deploy a stack.
pub async fn create_stack(
    State(state): State<AppState>,
    Json(request): Json<CreateStackRequest>,
) -> ApiResponse {
    info!(chain_name = %request.chain_name, network = %request.network, "create stack requested");
    respond(state.orchestrator.create_stack(request).await, |id| {
        Some(json!({ "stackId": id }))
    })
}

/// `POST /stacks/thanos/{id}/resume`.
pub async fn resume_stack(State(state): State<AppState>, Path(id): Path<String>) -> ApiResponse {
    let stack_id = match parse_stack_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    respond(state.orchestrator.resume_stack(&stack_id).await, |()| None)
}

/// `POST /stacks/thanos/{id}/stop`.
pub async fn stop_stack(State(state): State<AppState>, Path(id): Path<String>) -> ApiResponse {
    let stack_id = match parse_stack_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    respond(state.orchestrator.stop_stack(&stack_id).await, |()| None)
}

/// `PUT /stacks/thanos/{id}` — update network settings.
pub async fn update_network(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateNetworkRequest>,
) -> ApiResponse {
    let stack_id = match parse_stack_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    respond(
        state.orchestrator.update_network(&stack_id, request).await,
        |()| None,
    )
}

/// `DELETE /stacks/thanos/{id}` — terminate.
pub async fn terminate_stack(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResponse {
    let stack_id = match parse_stack_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    respond(state.orchestrator.terminate_stack(&stack_id).await, |()| {
        None
    })
}

/// `GET /stacks/thanos` — list all stacks.
pub async fn get_all_stacks(State(state): State<AppState>) -> ApiResponse {
    respond(state.orchestrator.get_all_stacks().await, |stacks| {
        Some(json!({ "stacks": stacks }))
    })
}

/// `GET /stacks/thanos/{id}`.
pub async fn get_stack(State(state): State<AppState>, Path(id): Path<String>) -> ApiResponse {
    let stack_id = match parse_stack_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    respond(state.orchestrator.get_stack(&stack_id).await, |stack| {
        Some(json!({ "stack": stack }))
    })
}

/// `GET /stacks/thanos/{id}/status`.
pub async fn get_stack_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResponse {
    let stack_id = match parse_stack_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    respond(
        state.orchestrator.get_stack_status(&stack_id).await,
        |status| Some(json!({ "status": status })),
    )
}

/// `GET /stacks/thanos/{id}/deployments`.
pub async fn get_deployments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResponse {
    let stack_id = match parse_stack_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    respond(
        state.orchestrator.get_deployments(&stack_id).await,
        |deployments| Some(json!({ "deployments": deployments })),
    )
}

/// `GET /stacks/thanos/{id}/deployments/{deployment_id}`.
pub async fn get_deployment(
    State(state): State<AppState>,
    Path((id, deployment_id)): Path<(String, String)>,
) -> ApiResponse {
    if let Err(response) = parse_stack_id(&id) {
        return response;
    }
    let Ok(deployment_id) = DeploymentId::parse(&deployment_id) else {
        return ApiResponse::bad_request("Invalid deployment id");
    };
    respond(
        state.orchestrator.get_deployment(&deployment_id).await,
        |deployment| Some(json!({ "deployment": deployment })),
    )
}

/// `GET /stacks/thanos/{id}/deployments/{deployment_id}/status`.
pub async fn get_deployment_status(
    State(state): State<AppState>,
    Path((id, deployment_id)): Path<(String, String)>,
) -> ApiResponse {
    if let Err(response) = parse_stack_id(&id) {
        return response;
    }
    let Ok(deployment_id) = DeploymentId::parse(&deployment_id) else {
        return ApiResponse::bad_request("Invalid deployment id");
    };
    respond(
        state.orchestrator.get_deployment_status(&deployment_id).await,
        |status| Some(json!({ "status": status })),
    )
}
