//! Deploy and terminate job bodies.

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use thanos_sdk::{DeployContractsParams, DeployInfraParams};

use crate::dto::{AwsInfraConfig, L1ContractsConfig};
use crate::error::{ServiceError, ServiceResult};
use crate::paths;
use crate::types::{DeploymentRecord, DeploymentStatus, IntegrationType, StackId, StackStatus};

use super::StackOrchestrator;

impl StackOrchestrator {
    /// Body of the `deploy-thanos-stack-<id>` job.
    ///
    /// Idempotent: completed steps are skipped, so the same job id serves
    /// first deployment and every resume.
    pub(super) async fn run_deploy_job(&self, token: CancellationToken, stack_id: StackId) {
        if let Err(e) = self
            .store()
            .update_stack_status(&stack_id, StackStatus::Deploying, "")
            .await
        {
            error!(stack_id = %stack_id, error = %e, "failed to mark stack deploying");
            return;
        }

        match self.execute_deploy_steps(&token, &stack_id).await {
            Ok(()) => self.finalise_deployment(token, &stack_id).await,
            Err(ServiceError::Cancelled) => {
                // The in-flight deployment row is already Stopped; the
                // stack status was set by whoever requested the stop.
                info!(stack_id = %stack_id, "deployment cancelled");
            }
            Err(e) => {
                error!(stack_id = %stack_id, error = %e, "deployment failed");
                if let Err(update_err) = self
                    .store()
                    .update_stack_status(
                        &stack_id,
                        StackStatus::FailedToDeploy,
                        &Self::failure_reason(&e),
                    )
                    .await
                {
                    error!(stack_id = %stack_id, error = %update_err, "failed to record deploy failure");
                }
                if let Err(update_err) = self
                    .store()
                    .update_all_integration_statuses(&stack_id, DeploymentStatus::Failed)
                    .await
                {
                    error!(stack_id = %stack_id, error = %update_err, "failed to fail integrations");
                }
            }
        }
    }

    /// Run every incomplete deployment step in order.
    async fn execute_deploy_steps(
        &self,
        token: &CancellationToken,
        stack_id: &StackId,
    ) -> ServiceResult<()> {
        let stack = self.require_stack(stack_id).await?;
        let config = Self::stack_config(&stack)?;

        let deployments = self.store().get_deployments_by_stack(stack_id).await?;
        if deployments.is_empty() {
            return Err(ServiceError::internal(format!(
                "no deployments found for stack {stack_id}"
            )));
        }

        for deployment in deployments {
            info!(
                deployment_id = %deployment.id,
                step = deployment.step,
                status = %deployment.status,
                "processing deployment"
            );

            if deployment.status == DeploymentStatus::Completed {
                continue;
            }

            let mut client = match self
                .sdk()
                .connect(self.connect_options(
                    token.clone(),
                    &stack,
                    &config,
                    deployment.log_path.clone().into(),
                ))
                .await
            {
                Ok(client) => client,
                Err(e) => {
                    self.mark_deployment(&deployment, DeploymentStatus::Failed).await;
                    return Err(e.into());
                }
            };

            self.mark_deployment(&deployment, DeploymentStatus::InProgress)
                .await;

            let result = match deployment.step {
                1 => {
                    let step: L1ContractsConfig =
                        serde_json::from_value(deployment.config.clone())?;
                    client
                        .deploy_l1_contracts(&DeployContractsParams {
                            l1_rpc_url: step.l1_rpc_url,
                            chain_configuration: thanos_sdk::ChainConfiguration {
                                l2_block_time: step.l2_block_time,
                                batch_submission_frequency: step.batch_submission_frequency,
                                output_root_frequency: step.output_root_frequency,
                                challenge_period: step.challenge_period,
                            },
                            admin_key: step.admin_account,
                            sequencer_key: step.sequencer_account,
                            batcher_key: step.batcher_account,
                            proposer_key: step.proposer_account,
                        })
                        .await
                }
                2 => {
                    let step: AwsInfraConfig = serde_json::from_value(deployment.config.clone())?;
                    client
                        .deploy_aws_infrastructure(&DeployInfraParams {
                            chain_name: step.chain_name,
                            l1_beacon_url: step.l1_beacon_url,
                        })
                        .await
                }
                other => {
                    return Err(ServiceError::internal(format!(
                        "unexpected deployment step {other}"
                    )))
                }
            };

            match result {
                Ok(()) => {
                    self.mark_deployment(&deployment, DeploymentStatus::Completed)
                        .await;
                }
                Err(e) if e.is_cancelled() => {
                    info!(
                        deployment_id = %deployment.id,
                        step = deployment.step,
                        "deployment step cancelled"
                    );
                    self.mark_deployment(&deployment, DeploymentStatus::Stopped)
                        .await;
                    return Err(ServiceError::Cancelled);
                }
                Err(e) => {
                    error!(
                        deployment_id = %deployment.id,
                        step = deployment.step,
                        error = %e,
                        "deployment step failed"
                    );
                    self.mark_deployment(&deployment, DeploymentStatus::Failed)
                        .await;
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }

    async fn mark_deployment(&self, deployment: &DeploymentRecord, status: DeploymentStatus) {
        if let Err(e) = self
            .store()
            .update_deployment_status(&deployment.id, status)
            .await
        {
            error!(
                deployment_id = %deployment.id,
                error = %e,
                "failed to update deployment status"
            );
        }
    }

    /// All steps completed: mark the stack Deployed, record its public
    /// endpoints and complete the default integrations. Failures past this
    /// point are logged, never fatal; the stack stays Deployed.
    async fn finalise_deployment(&self, token: CancellationToken, stack_id: &StackId) {
        if let Err(e) = self
            .store()
            .update_stack_status(stack_id, StackStatus::Deployed, "")
            .await
        {
            error!(stack_id = %stack_id, error = %e, "failed to mark stack deployed");
        }

        let stack = match self.require_stack(stack_id).await {
            Ok(stack) => stack,
            Err(e) => {
                error!(stack_id = %stack_id, error = %e, "failed to re-read stack");
                return;
            }
        };
        let config = match Self::stack_config(&stack) {
            Ok(config) => config,
            Err(e) => {
                error!(stack_id = %stack_id, error = %e, "failed to parse stack config");
                return;
            }
        };

        let mut client = match self
            .sdk()
            .connect(self.connect_options(
                token,
                &stack,
                &config,
                paths::log_path(stack_id, "information"),
            ))
            .await
        {
            Ok(client) => client,
            Err(e) => {
                error!(stack_id = %stack_id, error = %e, "failed to create SDK client");
                return;
            }
        };

        let chain_info = match client.show_chain_information().await {
            Ok(info) => info,
            Err(e) => {
                error!(stack_id = %stack_id, error = %e, "failed to fetch chain information");
                return;
            }
        };

        let mut metadata = stack.metadata.clone();
        metadata.l2_url = Some(chain_info.l2_rpc_url);
        metadata.bridge_url = Some(chain_info.bridge_url.clone());
        metadata.block_explorer_url = Some(chain_info.block_explorer_url);
        if let Err(e) = self.store().update_stack_metadata(stack_id, &metadata).await {
            error!(stack_id = %stack_id, error = %e, "failed to update stack metadata");
            return;
        }

        if chain_info.bridge_url.is_empty() {
            warn!(stack_id = %stack_id, "bridge URL is empty");
            return;
        }

        match self
            .store()
            .get_integration_by_type(stack_id, IntegrationType::Bridge)
            .await
        {
            Ok(Some(bridge)) => {
                if let Err(e) = self
                    .store()
                    .complete_integration(&bridge.id, &json!({ "url": chain_info.bridge_url }))
                    .await
                {
                    error!(stack_id = %stack_id, error = %e, "failed to complete bridge integration");
                }
            }
            Ok(None) => warn!(stack_id = %stack_id, "bridge integration not found"),
            Err(e) => error!(stack_id = %stack_id, error = %e, "failed to look up bridge integration"),
        }

        if config.register_candidate {
            self.complete_candidate_registration(&mut *client, stack_id, &config)
                .await;
        }

        info!(stack_id = %stack_id, "thanos stack deployed successfully");
    }

    async fn complete_candidate_registration(
        &self,
        client: &mut dyn crate::sdk::StackSdk,
        stack_id: &StackId,
        config: &crate::dto::CreateStackRequest,
    ) {
        let Some(params) = config.register_candidate_params.as_ref() else {
            warn!(stack_id = %stack_id, "registration requested without parameters");
            return;
        };

        let integration = match self
            .store()
            .get_integration_by_type(stack_id, IntegrationType::RegisterCandidate)
            .await
        {
            Ok(Some(integration)) => integration,
            Ok(None) => {
                warn!(stack_id = %stack_id, "register candidate integration not found");
                return;
            }
            Err(e) => {
                error!(stack_id = %stack_id, error = %e, "failed to look up candidate integration");
                return;
            }
        };

        let info = match client.get_registration_additional_info(params).await {
            Ok(info) => info,
            Err(e) => {
                error!(stack_id = %stack_id, error = %e, "failed to fetch registration info");
                return;
            }
        };

        if let Err(e) = self.store().complete_integration(&integration.id, &info).await {
            error!(stack_id = %stack_id, error = %e, "failed to complete candidate integration");
        }
    }

    /// Body of the `terminate-thanos-stack-<id>` job.
    pub(super) async fn run_terminate_job(&self, token: CancellationToken, stack_id: StackId) {
        let stack = match self.store().get_stack(&stack_id).await {
            Ok(Some(stack)) => stack,
            Ok(None) => {
                warn!(stack_id = %stack_id, "stack disappeared before termination");
                return;
            }
            Err(e) => {
                error!(stack_id = %stack_id, error = %e, "failed to read stack");
                return;
            }
        };
        // Remembered so a cancelled terminate can put the stack back
        // instead of stranding it in Terminating.
        let prior_status = stack.status;

        let config = match Self::stack_config(&stack) {
            Ok(config) => config,
            Err(e) => {
                error!(stack_id = %stack_id, error = %e, "failed to parse stack config");
                self.mark_stack(&stack_id, StackStatus::FailedToTerminate, &e.to_string())
                    .await;
                return;
            }
        };

        self.mark_stack(&stack_id, StackStatus::Terminating, "").await;

        let destroy = async {
            let mut client = self
                .sdk()
                .connect(self.connect_options(
                    token,
                    &stack,
                    &config,
                    paths::log_path(&stack_id, "destroy"),
                ))
                .await?;
            client.destroy_aws_infrastructure().await
        };

        match destroy.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {
                info!(stack_id = %stack_id, "termination cancelled, restoring prior status");
                self.mark_stack(&stack_id, prior_status, "").await;
                return;
            }
            Err(e) => {
                error!(stack_id = %stack_id, error = %e, "failed to destroy AWS infrastructure");
                self.mark_stack(&stack_id, StackStatus::FailedToTerminate, &e.to_string())
                    .await;
                return;
            }
        }

        self.mark_stack(&stack_id, StackStatus::Terminated, "").await;

        if let Err(e) = self
            .store()
            .update_all_deployment_statuses(&stack_id, DeploymentStatus::Terminated)
            .await
        {
            error!(stack_id = %stack_id, error = %e, "failed to terminate deployments");
        }
        if let Err(e) = self
            .store()
            .update_all_integration_statuses(&stack_id, DeploymentStatus::Terminated)
            .await
        {
            error!(stack_id = %stack_id, error = %e, "failed to terminate integrations");
        }

        info!(stack_id = %stack_id, "AWS infrastructure destroyed successfully");
    }

    pub(super) async fn mark_stack(&self, stack_id: &StackId, status: StackStatus, reason: &str) {
        if let Err(e) = self
            .store()
            .update_stack_status(stack_id, status, reason)
            .await
        {
            error!(
                stack_id = %stack_id,
                status = %status,
                error = %e,
                "failed to update stack status"
            );
        }
    }
}
