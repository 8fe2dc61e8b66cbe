//! Integration install/uninstall pipelines.
//!
//! One skeleton parameterized by [`IntegrationType`]: guard the stack is
//! Deployed and no active integration of the type exists, enqueue the job,
//! and in the job body create the row InProgress, run the type's SDK
//! strategy, then either complete the row (recording its URL or info blob)
//! or fail it with a reason. URL-bearing types mirror the URL into the
//! parent stack's metadata.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use thanos_sdk::CandidateParams;

use crate::dto::{InstallBlockExplorerRequest, InstallMonitoringRequest, RegisterCandidateRequest};
use crate::error::{ServiceError, ServiceResult};
use crate::paths;
use crate::sdk::StackSdk;
use crate::types::{
    DeploymentStatus, IntegrationRecord, IntegrationType, StackId, StackRecord, StackStatus,
};

use super::StackOrchestrator;

/// What an install strategy produced.
enum InstallOutcome {
    /// A URL, mirrored into stack metadata and stored as `{"url": ...}`.
    Url(String),
    /// An opaque info blob, stored as-is (candidate registration).
    Info(Value),
}

impl StackOrchestrator {
    /// Install the bridge front-end.
    pub async fn install_bridge(self: &Arc<Self>, stack_id: &StackId) -> ServiceResult<()> {
        self.install_integration(stack_id, IntegrationType::Bridge, None)
            .await
    }

    /// Remove the bridge front-end.
    pub async fn uninstall_bridge(self: &Arc<Self>, stack_id: &StackId) -> ServiceResult<()> {
        self.uninstall_integration(stack_id, IntegrationType::Bridge)
            .await
    }

    /// Install the block explorer.
    pub async fn install_block_explorer(
        self: &Arc<Self>,
        stack_id: &StackId,
        request: InstallBlockExplorerRequest,
    ) -> ServiceResult<()> {
        request.validate()?;
        self.install_integration(
            stack_id,
            IntegrationType::BlockExplorer,
            Some(serde_json::to_value(&request)?),
        )
        .await
    }

    /// Remove the block explorer.
    pub async fn uninstall_block_explorer(
        self: &Arc<Self>,
        stack_id: &StackId,
    ) -> ServiceResult<()> {
        self.uninstall_integration(stack_id, IntegrationType::BlockExplorer)
            .await
    }

    /// Install the monitoring stack.
    pub async fn install_monitoring(
        self: &Arc<Self>,
        stack_id: &StackId,
        request: InstallMonitoringRequest,
    ) -> ServiceResult<()> {
        request.validate()?;
        self.install_integration(
            stack_id,
            IntegrationType::Monitoring,
            Some(serde_json::to_value(&request)?),
        )
        .await
    }

    /// Remove the monitoring stack.
    pub async fn uninstall_monitoring(self: &Arc<Self>, stack_id: &StackId) -> ServiceResult<()> {
        self.uninstall_integration(stack_id, IntegrationType::Monitoring)
            .await
    }

    /// Register the rollup as a DAO candidate.
    pub async fn register_candidate(
        self: &Arc<Self>,
        stack_id: &StackId,
        request: RegisterCandidateRequest,
    ) -> ServiceResult<()> {
        request.validate()?;
        self.install_integration(
            stack_id,
            IntegrationType::RegisterCandidate,
            Some(serde_json::to_value(&request)?),
        )
        .await
    }

    /// Shared install path: guards, then enqueues the install job.
    async fn install_integration(
        self: &Arc<Self>,
        stack_id: &StackId,
        kind: IntegrationType,
        config: Option<Value>,
    ) -> ServiceResult<()> {
        let stack = self.guarded_deployed_stack(stack_id).await?;

        let active = self.store().get_active_integrations(stack_id, kind).await?;
        if !active.is_empty() {
            return Err(ServiceError::Conflict(format!(
                "There is already an active {}",
                kind.display_name()
            )));
        }

        let task_id = match kind {
            IntegrationType::RegisterCandidate => format!("register-candidate-{stack_id}"),
            other => format!("install-{}-{stack_id}", other.as_str()),
        };
        let log_path = paths::log_path(stack_id, &install_action(kind));

        let orchestrator = Arc::clone(self);
        self.tasks()
            .add_task(task_id, move |token| async move {
                orchestrator
                    .run_install_job(token, stack, kind, config, log_path)
                    .await;
            })
            .await;

        Ok(())
    }

    async fn run_install_job(
        &self,
        token: CancellationToken,
        stack: StackRecord,
        kind: IntegrationType,
        config: Option<Value>,
        log_path: std::path::PathBuf,
    ) {
        let stack_id = stack.id.clone();
        let integration = IntegrationRecord::new(
            stack_id.clone(),
            kind,
            DeploymentStatus::InProgress,
            config.clone(),
            log_path.to_string_lossy().into_owned(),
        );
        if let Err(e) = self.store().create_integration(&integration).await {
            error!(stack_id = %stack_id, plugin = %kind, error = %e, "failed to create integration");
            return;
        }

        let stack_config = match Self::stack_config(&stack) {
            Ok(config) => config,
            Err(e) => {
                error!(stack_id = %stack_id, plugin = %kind, error = %e, "failed to parse stack config");
                self.fail_integration(&integration, &e.to_string()).await;
                return;
            }
        };

        let mut client = match self
            .sdk()
            .connect(self.connect_options(token, &stack, &stack_config, log_path))
            .await
        {
            Ok(client) => client,
            Err(e) => {
                error!(stack_id = %stack_id, plugin = %kind, error = %e, "failed to create SDK client");
                self.fail_integration(&integration, &e.to_string()).await;
                return;
            }
        };

        let outcome = match run_install_strategy(&mut *client, kind, config.as_ref()).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => {
                info!(stack_id = %stack_id, plugin = %kind, "install cancelled");
                if let Err(update_err) = self
                    .store()
                    .update_integration_status(&integration.id, DeploymentStatus::Stopped)
                    .await
                {
                    error!(
                        integration_id = %integration.id,
                        error = %update_err,
                        "failed to mark integration stopped"
                    );
                }
                return;
            }
            Err(e) => {
                error!(stack_id = %stack_id, plugin = %kind, error = %e, "install failed");
                self.fail_integration(&integration, &e.to_string()).await;
                return;
            }
        };

        match outcome {
            InstallOutcome::Url(url) => {
                if url.is_empty() {
                    self.fail_integration(
                        &integration,
                        &format!("{} URL is empty", kind.display_name()),
                    )
                    .await;
                    return;
                }

                if let Err(e) = self
                    .store()
                    .complete_integration(&integration.id, &json!({ "url": url }))
                    .await
                {
                    error!(integration_id = %integration.id, error = %e, "failed to complete integration");
                    return;
                }

                self.mirror_integration_url(&stack_id, kind, Some(url.clone()))
                    .await;
                info!(stack_id = %stack_id, plugin = %kind, url = %url, "integration installed");
            }
            InstallOutcome::Info(info) => {
                if let Err(e) = self.store().complete_integration(&integration.id, &info).await {
                    error!(integration_id = %integration.id, error = %e, "failed to complete integration");
                    return;
                }
                info!(stack_id = %stack_id, plugin = %kind, "integration completed");
            }
        }
    }

    /// Shared uninstall path: guards, then enqueues the uninstall job.
    async fn uninstall_integration(
        self: &Arc<Self>,
        stack_id: &StackId,
        kind: IntegrationType,
    ) -> ServiceResult<()> {
        let stack = self.guarded_deployed_stack(stack_id).await?;

        let orchestrator = Arc::clone(self);
        self.tasks()
            .add_task(
                format!("uninstall-{}-{stack_id}", kind.as_str()),
                move |token| async move {
                    orchestrator.run_uninstall_job(token, stack, kind).await;
                },
            )
            .await;

        Ok(())
    }

    async fn run_uninstall_job(
        &self,
        token: CancellationToken,
        stack: StackRecord,
        kind: IntegrationType,
    ) {
        let stack_id = stack.id.clone();
        let integration = match self.store().get_installed_integration(&stack_id, kind).await {
            Ok(Some(integration)) => integration,
            Ok(None) => {
                warn!(stack_id = %stack_id, plugin = %kind, "no installed integration to remove");
                return;
            }
            Err(e) => {
                error!(stack_id = %stack_id, plugin = %kind, error = %e, "failed to look up integration");
                return;
            }
        };

        let stack_config = match Self::stack_config(&stack) {
            Ok(config) => config,
            Err(e) => {
                error!(stack_id = %stack_id, plugin = %kind, error = %e, "failed to parse stack config");
                return;
            }
        };

        if let Err(e) = self
            .store()
            .update_integration_status(&integration.id, DeploymentStatus::Terminating)
            .await
        {
            error!(integration_id = %integration.id, error = %e, "failed to mark integration terminating");
            return;
        }

        info!(stack_id = %stack_id, plugin = %kind, "uninstalling integration");

        let log_path = paths::log_path(&stack_id, &format!("uninstall-{}", kind.as_str()));
        let result = async {
            let mut client = self
                .sdk()
                .connect(self.connect_options(token, &stack, &stack_config, log_path))
                .await?;
            match kind {
                IntegrationType::Bridge => client.uninstall_bridge().await,
                IntegrationType::BlockExplorer => client.uninstall_block_explorer().await,
                IntegrationType::Monitoring => client.uninstall_monitoring().await,
                IntegrationType::RegisterCandidate => Ok(()),
            }
        };

        if let Err(e) = result.await {
            error!(stack_id = %stack_id, plugin = %kind, error = %e, "uninstall failed");
            return;
        }

        if let Err(e) = self
            .store()
            .update_integration_status(&integration.id, DeploymentStatus::Terminated)
            .await
        {
            error!(integration_id = %integration.id, error = %e, "failed to mark integration terminated");
            return;
        }

        self.mirror_integration_url(&stack_id, kind, None).await;
        info!(stack_id = %stack_id, plugin = %kind, "integration uninstalled");
    }

    async fn guarded_deployed_stack(&self, stack_id: &StackId) -> ServiceResult<StackRecord> {
        let stack = self.require_stack(stack_id).await?;
        if stack.status != StackStatus::Deployed {
            return Err(ServiceError::conflict(
                "Stack is not deployed, yet. Please wait for it to finish",
            ));
        }
        Ok(stack)
    }

    async fn fail_integration(&self, integration: &IntegrationRecord, reason: &str) {
        if let Err(e) = self
            .store()
            .update_integration_status_with_reason(
                &integration.id,
                DeploymentStatus::Failed,
                reason,
            )
            .await
        {
            error!(
                integration_id = %integration.id,
                error = %e,
                "failed to record integration failure"
            );
        }
    }

    /// Write (or clear) the integration's URL slot in the stack metadata.
    async fn mirror_integration_url(
        &self,
        stack_id: &StackId,
        kind: IntegrationType,
        url: Option<String>,
    ) {
        let stack = match self.store().get_stack(stack_id).await {
            Ok(Some(stack)) => stack,
            Ok(None) => {
                warn!(stack_id = %stack_id, "stack disappeared while mirroring metadata");
                return;
            }
            Err(e) => {
                error!(stack_id = %stack_id, error = %e, "failed to read stack for metadata update");
                return;
            }
        };

        let mut metadata = stack.metadata;
        metadata.set_integration_url(kind, url);
        if let Err(e) = self.store().update_stack_metadata(stack_id, &metadata).await {
            error!(stack_id = %stack_id, error = %e, "failed to update stack metadata");
        }
    }
}

fn install_action(kind: IntegrationType) -> String {
    match kind {
        IntegrationType::RegisterCandidate => "register-candidate".to_owned(),
        other => format!("install-{}", other.as_str()),
    }
}

/// The type-specific part of the install pipeline.
async fn run_install_strategy(
    client: &mut dyn StackSdk,
    kind: IntegrationType,
    config: Option<&Value>,
) -> thanos_sdk::SdkResult<InstallOutcome> {
    match kind {
        IntegrationType::Bridge => client.install_bridge().await.map(InstallOutcome::Url),
        IntegrationType::BlockExplorer => {
            let config = config.cloned().unwrap_or(Value::Null);
            client
                .install_block_explorer(&config)
                .await
                .map(InstallOutcome::Url)
        }
        IntegrationType::Monitoring => {
            let password = config
                .and_then(|c| c.get("grafanaPassword"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            let monitoring_config = client.get_monitoring_config(&password).await?;
            client
                .install_monitoring(&monitoring_config)
                .await
                .map(InstallOutcome::Url)
        }
        IntegrationType::RegisterCandidate => {
            let params: CandidateParams = config
                .cloned()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| thanos_sdk::SdkError::Parse(e.to_string()))?
                .ok_or_else(|| {
                    thanos_sdk::SdkError::BadConfig("registration parameters missing".to_owned())
                })?;
            client.verify_register_candidates(&params).await?;
            client
                .get_registration_additional_info(&params)
                .await
                .map(InstallOutcome::Info)
        }
    }
}
