//! The stack lifecycle orchestrator.
//!
//! API-facing methods validate input, perform the minimum synchronous
//! persistence, enqueue a job on the task manager and return. Job bodies
//! (in [`pipeline`] and [`integrations`]) re-read state by id, drive the
//! SDK and persist status transitions after each step. Failures inside a
//! job never reach the API caller that enqueued it; they become status
//! transitions observable through subsequent queries.

mod integrations;
mod pipeline;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::dto::{CreateStackRequest, UpdateNetworkRequest};
use crate::error::{ServiceError, ServiceResult};
use crate::paths;
use crate::sdk::{ConnectOptions, SdkConnector};
use crate::store::Store;
use crate::tasks::TaskManager;
use crate::types::{
    DeploymentId, DeploymentRecord, DeploymentStatus, IntegrationId, IntegrationRecord,
    IntegrationType, StackId, StackRecord, StackStatus,
};

/// Worker pool size.
pub const TASK_WORKERS: usize = 5;
/// Pending-job queue capacity.
pub const TASK_QUEUE_CAPACITY: usize = 20;

/// Stack family name; every stack this service manages is a Thanos stack.
const STACK_NAME: &str = "Thanos";

/// Orchestrates the lifecycle of Thanos stacks.
pub struct StackOrchestrator {
    store: Arc<dyn Store>,
    sdk: Arc<dyn SdkConnector>,
    tasks: TaskManager,
}

impl StackOrchestrator {
    /// Create the orchestrator and start its worker pool.
    pub async fn new(store: Arc<dyn Store>, sdk: Arc<dyn SdkConnector>) -> Arc<Self> {
        Self::with_pool(store, sdk, TASK_WORKERS, TASK_QUEUE_CAPACITY).await
    }

    /// Create the orchestrator with an explicit pool geometry.
    pub async fn with_pool(
        store: Arc<dyn Store>,
        sdk: Arc<dyn SdkConnector>,
        workers: usize,
        queue_capacity: usize,
    ) -> Arc<Self> {
        let orchestrator = Arc::new(Self {
            store,
            sdk,
            tasks: TaskManager::new(workers, queue_capacity),
        });
        orchestrator.tasks.start().await;
        orchestrator
    }

    /// Stop the worker pool, cancelling running jobs.
    pub async fn shutdown(&self) {
        self.tasks.stop().await;
    }

    pub(crate) fn deploy_task_id(stack_id: &StackId) -> String {
        format!("deploy-thanos-stack-{stack_id}")
    }

    fn terminate_task_id(stack_id: &StackId) -> String {
        format!("terminate-thanos-stack-{stack_id}")
    }

    /// Validate and persist a new stack, then enqueue its deploy job.
    ///
    /// Returns the stack id as soon as the rows are durable; deployment
    /// progress is observable through the status queries.
    pub async fn create_stack(
        self: &Arc<Self>,
        request: CreateStackRequest,
    ) -> ServiceResult<StackId> {
        request.validate(self.sdk.as_ref()).await?;
        let mut request = request.normalised();

        let stack_id = StackId::generate();
        let deployment_path = paths::deployment_path(STACK_NAME, request.network, &stack_id)
            .to_string_lossy()
            .into_owned();
        request.deployment_path = Some(deployment_path.clone());

        let now = Utc::now();
        let stack = StackRecord {
            id: stack_id.clone(),
            name: STACK_NAME.to_owned(),
            network: request.network,
            config: serde_json::to_value(&request)?,
            deployment_path,
            metadata: Default::default(),
            status: StackStatus::Pending,
            reason: None,
            created_at: now,
            updated_at: now,
        };

        let deployments = vec![
            DeploymentRecord {
                id: DeploymentId::generate(),
                stack_id: stack_id.clone(),
                step: 1,
                status: DeploymentStatus::Pending,
                log_path: paths::log_path(&stack_id, "deploy-l1-contracts")
                    .to_string_lossy()
                    .into_owned(),
                config: request.l1_contracts_config()?,
                created_at: now,
                updated_at: now,
            },
            DeploymentRecord {
                id: DeploymentId::generate(),
                stack_id: stack_id.clone(),
                step: 2,
                status: DeploymentStatus::Pending,
                log_path: paths::log_path(&stack_id, "deploy-thanos-aws-infra")
                    .to_string_lossy()
                    .into_owned(),
                config: request.aws_infra_config()?,
                created_at: now,
                updated_at: now,
            },
        ];

        // The bridge ships with every stack; candidate registration only
        // when requested.
        let mut integrations = vec![IntegrationRecord::new(
            stack_id.clone(),
            IntegrationType::Bridge,
            DeploymentStatus::Pending,
            None,
            String::new(),
        )];
        if request.register_candidate {
            integrations.push(IntegrationRecord::new(
                stack_id.clone(),
                IntegrationType::RegisterCandidate,
                DeploymentStatus::Pending,
                None,
                String::new(),
            ));
        }

        self.store
            .create_stack(&stack, &deployments, &integrations)
            .await?;

        info!(stack_id = %stack_id, network = %request.network, "stack created");
        self.enqueue_deploy(stack_id.clone()).await;

        Ok(stack_id)
    }

    async fn enqueue_deploy(self: &Arc<Self>, stack_id: StackId) {
        let orchestrator = Arc::clone(self);
        self.tasks
            .add_task(Self::deploy_task_id(&stack_id), move |token| async move {
                orchestrator.run_deploy_job(token, stack_id).await;
            })
            .await;
    }

    /// Stop a deploying stack: cancel its running deploy job and mark it
    /// Stopped. The worker marks the in-flight deployment row on its way
    /// out.
    pub async fn stop_stack(&self, stack_id: &StackId) -> ServiceResult<()> {
        let stack = self.require_stack(stack_id).await?;
        if stack.status != StackStatus::Deploying {
            return Err(ServiceError::conflict(
                "Stack is not deploying, yet. Please wait for it to finish",
            ));
        }

        self.tasks.stop_task(&Self::deploy_task_id(stack_id));
        self.store
            .update_stack_status(stack_id, StackStatus::Stopped, "")
            .await?;

        info!(stack_id = %stack_id, "stack stopped");
        Ok(())
    }

    /// Re-enqueue the deploy job for a stopped, failed or terminated
    /// stack. The pipeline skips already-completed steps.
    pub async fn resume_stack(self: &Arc<Self>, stack_id: &StackId) -> ServiceResult<()> {
        let stack = self.require_stack(stack_id).await?;
        if !stack.status.can_resume() {
            return Err(ServiceError::conflict(
                "Stack is not stopped, failed or terminated; nothing to resume",
            ));
        }

        info!(stack_id = %stack_id, from = %stack.status, "resuming stack");
        self.enqueue_deploy(stack_id.clone()).await;
        Ok(())
    }

    /// Enqueue the terminate job for a stack that is not mid-flight.
    pub async fn terminate_stack(self: &Arc<Self>, stack_id: &StackId) -> ServiceResult<()> {
        let stack = self.require_stack(stack_id).await?;
        if !stack.status.can_terminate() {
            return Err(ServiceError::conflict(
                "The stack is still deploying, updating or terminating, \
                 please wait for it to finish",
            ));
        }

        let orchestrator = Arc::clone(self);
        let id = stack_id.clone();
        self.tasks
            .add_task(Self::terminate_task_id(stack_id), move |token| async move {
                orchestrator.run_terminate_job(token, id).await;
            })
            .await;

        Ok(())
    }

    /// Update the stack's network settings.
    ///
    /// The stack sits in Updating while the job runs; it returns to
    /// Deployed on success and lands in FailedToUpdate on SDK failure.
    pub async fn update_network(
        self: &Arc<Self>,
        stack_id: &StackId,
        request: UpdateNetworkRequest,
    ) -> ServiceResult<()> {
        request.validate(self.sdk.as_ref()).await?;

        let stack = self.require_stack(stack_id).await?;
        if stack.status != StackStatus::Deployed {
            return Err(ServiceError::conflict(
                "Stack is not deployed, yet. Please wait for it to finish",
            ));
        }

        self.store
            .update_stack_status(stack_id, StackStatus::Updating, "")
            .await?;

        let orchestrator = Arc::clone(self);
        let id = stack_id.clone();
        self.tasks
            .add_task(format!("update-network-{stack_id}"), move |token| async move {
                orchestrator.run_update_network_job(token, id, request).await;
            })
            .await;

        Ok(())
    }

    async fn run_update_network_job(
        &self,
        token: CancellationToken,
        stack_id: StackId,
        request: UpdateNetworkRequest,
    ) {
        let result = self.execute_update_network(token, &stack_id, &request).await;

        let (status, reason) = match result {
            // Nothing was changed remotely on cancellation; the stack is
            // still the deployed one.
            Ok(()) | Err(ServiceError::Cancelled) => (StackStatus::Deployed, String::new()),
            Err(e) => {
                error!(stack_id = %stack_id, error = %e, "network update failed");
                (StackStatus::FailedToUpdate, Self::failure_reason(&e))
            }
        };

        if let Err(e) = self
            .store
            .update_stack_status(&stack_id, status, &reason)
            .await
        {
            error!(stack_id = %stack_id, error = %e, "failed to update stack status");
        }
    }

    async fn execute_update_network(
        &self,
        token: CancellationToken,
        stack_id: &StackId,
        request: &UpdateNetworkRequest,
    ) -> ServiceResult<()> {
        let stack = self.require_stack(stack_id).await?;
        let config = Self::stack_config(&stack)?;

        let mut client = self
            .sdk
            .connect(self.connect_options(
                token,
                &stack,
                &config,
                paths::log_path(stack_id, "update-network"),
            ))
            .await?;

        client
            .update_network(&thanos_sdk::UpdateNetworkParams {
                l1_rpc_url: request.l1_rpc_url.clone(),
                l1_beacon_url: request.l1_beacon_url.clone(),
            })
            .await?;
        Ok(())
    }

    /// All stacks, newest first.
    pub async fn get_all_stacks(&self) -> ServiceResult<Vec<StackRecord>> {
        self.store.get_all_stacks().await
    }

    /// One stack by id.
    pub async fn get_stack(&self, stack_id: &StackId) -> ServiceResult<StackRecord> {
        self.require_stack(stack_id).await
    }

    /// Status of one stack.
    pub async fn get_stack_status(&self, stack_id: &StackId) -> ServiceResult<StackStatus> {
        self.store
            .get_stack_status(stack_id)
            .await?
            .ok_or(ServiceError::NotFound("Stack"))
    }

    /// Deployments of a stack in step order.
    pub async fn get_deployments(&self, stack_id: &StackId) -> ServiceResult<Vec<DeploymentRecord>> {
        self.require_stack(stack_id).await?;
        self.store.get_deployments_by_stack(stack_id).await
    }

    /// One deployment by id.
    pub async fn get_deployment(&self, id: &DeploymentId) -> ServiceResult<DeploymentRecord> {
        self.store
            .get_deployment(id)
            .await?
            .ok_or(ServiceError::NotFound("Deployment"))
    }

    /// Status of one deployment.
    pub async fn get_deployment_status(
        &self,
        id: &DeploymentId,
    ) -> ServiceResult<DeploymentStatus> {
        self.store
            .get_deployment_status(id)
            .await?
            .ok_or(ServiceError::NotFound("Deployment"))
    }

    /// Active integrations of a stack.
    pub async fn get_integrations(
        &self,
        stack_id: &StackId,
    ) -> ServiceResult<Vec<IntegrationRecord>> {
        self.require_stack(stack_id).await?;
        self.store.get_active_integrations_by_stack(stack_id).await
    }

    /// One integration by id.
    pub async fn get_integration(&self, id: &IntegrationId) -> ServiceResult<IntegrationRecord> {
        self.store
            .get_integration(id)
            .await?
            .ok_or(ServiceError::NotFound("Integration"))
    }

    pub(crate) async fn require_stack(&self, stack_id: &StackId) -> ServiceResult<StackRecord> {
        self.store
            .get_stack(stack_id)
            .await?
            .ok_or(ServiceError::NotFound("Stack"))
    }

    /// Deserialise the persisted deploy request from a stack row.
    pub(crate) fn stack_config(stack: &StackRecord) -> ServiceResult<CreateStackRequest> {
        Ok(serde_json::from_value(stack.config.clone())?)
    }

    pub(crate) fn connect_options(
        &self,
        cancel: CancellationToken,
        stack: &StackRecord,
        config: &CreateStackRequest,
        log_path: PathBuf,
    ) -> ConnectOptions {
        ConnectOptions {
            cancel,
            log_path,
            network: stack.network,
            deployment_path: stack.deployment_path.clone(),
            register_candidate: config.register_candidate,
            aws: config.aws_credentials(),
        }
    }

    /// Reason string recorded for a failure status; the bare SDK message
    /// where there is one.
    pub(crate) fn failure_reason(error: &ServiceError) -> String {
        match error {
            ServiceError::Sdk(message) => message.clone(),
            other => other.to_string(),
        }
    }

    pub(crate) fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub(crate) fn sdk(&self) -> &dyn SdkConnector {
        self.sdk.as_ref()
    }

    pub(crate) fn tasks(&self) -> &TaskManager {
        &self.tasks
    }
}

impl std::fmt::Debug for StackOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackOrchestrator").finish_non_exhaustive()
    }
}
