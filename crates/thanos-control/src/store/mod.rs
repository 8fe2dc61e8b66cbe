//! Persistence backends for stacks, deployments and integrations.
//!
//! The primary implementation is PostgreSQL; an in-memory implementation
//! backs the test suite. Every mutation is durable before the call returns,
//! absent rows are `Ok(None)`, and update operations on missing rows report
//! [`crate::error::ServiceError::NotFound`].

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ServiceResult;
use crate::types::{
    DeploymentId, DeploymentRecord, DeploymentStatus, IntegrationId, IntegrationRecord,
    IntegrationType, StackId, StackMetadata, StackRecord, StackStatus,
};

/// Storage backend for the orchestrator.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create a stack together with its deployments and initial
    /// integrations in a single transaction: all rows commit or none do.
    async fn create_stack(
        &self,
        stack: &StackRecord,
        deployments: &[DeploymentRecord],
        integrations: &[IntegrationRecord],
    ) -> ServiceResult<()>;

    /// Get a stack by id.
    async fn get_stack(&self, id: &StackId) -> ServiceResult<Option<StackRecord>>;

    /// All stacks, newest first.
    async fn get_all_stacks(&self) -> ServiceResult<Vec<StackRecord>>;

    /// Status of a stack.
    async fn get_stack_status(&self, id: &StackId) -> ServiceResult<Option<StackStatus>>;

    /// Update a stack's status. The reason is replaced wholesale; an empty
    /// reason clears any prior one.
    async fn update_stack_status(
        &self,
        id: &StackId,
        status: StackStatus,
        reason: &str,
    ) -> ServiceResult<()>;

    /// Replace a stack's metadata blob.
    async fn update_stack_metadata(
        &self,
        id: &StackId,
        metadata: &StackMetadata,
    ) -> ServiceResult<()>;

    /// Deployments of a stack in ascending `step` order.
    async fn get_deployments_by_stack(
        &self,
        stack_id: &StackId,
    ) -> ServiceResult<Vec<DeploymentRecord>>;

    /// Get a deployment by id.
    async fn get_deployment(&self, id: &DeploymentId) -> ServiceResult<Option<DeploymentRecord>>;

    /// Status of a deployment.
    async fn get_deployment_status(
        &self,
        id: &DeploymentId,
    ) -> ServiceResult<Option<DeploymentStatus>>;

    /// Update a deployment's status.
    async fn update_deployment_status(
        &self,
        id: &DeploymentId,
        status: DeploymentStatus,
    ) -> ServiceResult<()>;

    /// Move every deployment of a stack to `status` (used on termination).
    async fn update_all_deployment_statuses(
        &self,
        stack_id: &StackId,
        status: DeploymentStatus,
    ) -> ServiceResult<()>;

    /// Insert a new integration row.
    async fn create_integration(&self, integration: &IntegrationRecord) -> ServiceResult<()>;

    /// Get an integration by id.
    async fn get_integration(
        &self,
        id: &IntegrationId,
    ) -> ServiceResult<Option<IntegrationRecord>>;

    /// First integration of a type for a stack, regardless of status.
    async fn get_integration_by_type(
        &self,
        stack_id: &StackId,
        kind: IntegrationType,
    ) -> ServiceResult<Option<IntegrationRecord>>;

    /// The Completed integration of a type for a stack, if any.
    async fn get_installed_integration(
        &self,
        stack_id: &StackId,
        kind: IntegrationType,
    ) -> ServiceResult<Option<IntegrationRecord>>;

    /// Non-terminal integrations of a type for a stack.
    async fn get_active_integrations(
        &self,
        stack_id: &StackId,
        kind: IntegrationType,
    ) -> ServiceResult<Vec<IntegrationRecord>>;

    /// Non-terminal integrations of a stack, oldest first.
    async fn get_active_integrations_by_stack(
        &self,
        stack_id: &StackId,
    ) -> ServiceResult<Vec<IntegrationRecord>>;

    /// Update an integration's status, clearing any reason.
    async fn update_integration_status(
        &self,
        id: &IntegrationId,
        status: DeploymentStatus,
    ) -> ServiceResult<()>;

    /// Update an integration's status and record why.
    async fn update_integration_status_with_reason(
        &self,
        id: &IntegrationId,
        status: DeploymentStatus,
        reason: &str,
    ) -> ServiceResult<()>;

    /// Replace an integration's config blob.
    async fn update_integration_config(
        &self,
        id: &IntegrationId,
        config: &Value,
    ) -> ServiceResult<()>;

    /// Atomically record the integration's result and mark it Completed.
    async fn complete_integration(&self, id: &IntegrationId, info: &Value) -> ServiceResult<()>;

    /// Move every integration of a stack to `status` (used on termination
    /// and on deploy failure).
    async fn update_all_integration_statuses(
        &self,
        stack_id: &StackId,
        status: DeploymentStatus,
    ) -> ServiceResult<()>;
}
