//! In-memory store for tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ServiceError, ServiceResult};
use crate::types::{
    DeploymentId, DeploymentRecord, DeploymentStatus, IntegrationId, IntegrationRecord,
    IntegrationType, StackId, StackMetadata, StackRecord, StackStatus,
};

use super::Store;

/// In-memory store. Data is lost when the process exits; not for
/// production use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    stacks: RwLock<HashMap<String, StackRecord>>,
    deployments: RwLock<HashMap<String, DeploymentRecord>>,
    integrations: RwLock<HashMap<String, IntegrationRecord>>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_err() -> ServiceError {
    ServiceError::internal("lock poisoned")
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_stack(
        &self,
        stack: &StackRecord,
        deployments: &[DeploymentRecord],
        integrations: &[IntegrationRecord],
    ) -> ServiceResult<()> {
        let mut stacks = self.stacks.write().map_err(|_| lock_err())?;
        if stacks.contains_key(stack.id.as_str()) {
            return Err(ServiceError::internal(format!(
                "stack {} already exists",
                stack.id
            )));
        }

        let mut deployment_map = self.deployments.write().map_err(|_| lock_err())?;
        let mut integration_map = self.integrations.write().map_err(|_| lock_err())?;

        stacks.insert(stack.id.as_str().to_owned(), stack.clone());
        for deployment in deployments {
            deployment_map.insert(deployment.id.as_str().to_owned(), deployment.clone());
        }
        for integration in integrations {
            integration_map.insert(integration.id.as_str().to_owned(), integration.clone());
        }
        Ok(())
    }

    async fn get_stack(&self, id: &StackId) -> ServiceResult<Option<StackRecord>> {
        let stacks = self.stacks.read().map_err(|_| lock_err())?;
        Ok(stacks.get(id.as_str()).cloned())
    }

    async fn get_all_stacks(&self) -> ServiceResult<Vec<StackRecord>> {
        let stacks = self.stacks.read().map_err(|_| lock_err())?;
        let mut all: Vec<_> = stacks.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn get_stack_status(&self, id: &StackId) -> ServiceResult<Option<StackStatus>> {
        let stacks = self.stacks.read().map_err(|_| lock_err())?;
        Ok(stacks.get(id.as_str()).map(|s| s.status))
    }

    async fn update_stack_status(
        &self,
        id: &StackId,
        status: StackStatus,
        reason: &str,
    ) -> ServiceResult<()> {
        let mut stacks = self.stacks.write().map_err(|_| lock_err())?;
        let stack = stacks
            .get_mut(id.as_str())
            .ok_or(ServiceError::NotFound("Stack"))?;
        stack.status = status;
        stack.reason = if reason.is_empty() {
            None
        } else {
            Some(reason.to_owned())
        };
        stack.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn update_stack_metadata(
        &self,
        id: &StackId,
        metadata: &StackMetadata,
    ) -> ServiceResult<()> {
        let mut stacks = self.stacks.write().map_err(|_| lock_err())?;
        let stack = stacks
            .get_mut(id.as_str())
            .ok_or(ServiceError::NotFound("Stack"))?;
        stack.metadata = metadata.clone();
        stack.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn get_deployments_by_stack(
        &self,
        stack_id: &StackId,
    ) -> ServiceResult<Vec<DeploymentRecord>> {
        let deployments = self.deployments.read().map_err(|_| lock_err())?;
        let mut found: Vec<_> = deployments
            .values()
            .filter(|d| d.stack_id == *stack_id)
            .cloned()
            .collect();
        found.sort_by_key(|d| d.step);
        Ok(found)
    }

    async fn get_deployment(&self, id: &DeploymentId) -> ServiceResult<Option<DeploymentRecord>> {
        let deployments = self.deployments.read().map_err(|_| lock_err())?;
        Ok(deployments.get(id.as_str()).cloned())
    }

    async fn get_deployment_status(
        &self,
        id: &DeploymentId,
    ) -> ServiceResult<Option<DeploymentStatus>> {
        let deployments = self.deployments.read().map_err(|_| lock_err())?;
        Ok(deployments.get(id.as_str()).map(|d| d.status))
    }

    async fn update_deployment_status(
        &self,
        id: &DeploymentId,
        status: DeploymentStatus,
    ) -> ServiceResult<()> {
        let mut deployments = self.deployments.write().map_err(|_| lock_err())?;
        let deployment = deployments
            .get_mut(id.as_str())
            .ok_or(ServiceError::NotFound("Deployment"))?;
        deployment.status = status;
        deployment.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn update_all_deployment_statuses(
        &self,
        stack_id: &StackId,
        status: DeploymentStatus,
    ) -> ServiceResult<()> {
        let mut deployments = self.deployments.write().map_err(|_| lock_err())?;
        for deployment in deployments.values_mut() {
            if deployment.stack_id == *stack_id {
                deployment.status = status;
                deployment.updated_at = chrono::Utc::now();
            }
        }
        Ok(())
    }

    async fn create_integration(&self, integration: &IntegrationRecord) -> ServiceResult<()> {
        let mut integrations = self.integrations.write().map_err(|_| lock_err())?;
        integrations.insert(integration.id.as_str().to_owned(), integration.clone());
        Ok(())
    }

    async fn get_integration(
        &self,
        id: &IntegrationId,
    ) -> ServiceResult<Option<IntegrationRecord>> {
        let integrations = self.integrations.read().map_err(|_| lock_err())?;
        Ok(integrations.get(id.as_str()).cloned())
    }

    async fn get_integration_by_type(
        &self,
        stack_id: &StackId,
        kind: IntegrationType,
    ) -> ServiceResult<Option<IntegrationRecord>> {
        let integrations = self.integrations.read().map_err(|_| lock_err())?;
        let mut found: Vec<_> = integrations
            .values()
            .filter(|i| i.stack_id == *stack_id && i.kind == kind)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found.into_iter().next())
    }

    async fn get_installed_integration(
        &self,
        stack_id: &StackId,
        kind: IntegrationType,
    ) -> ServiceResult<Option<IntegrationRecord>> {
        let integrations = self.integrations.read().map_err(|_| lock_err())?;
        Ok(integrations
            .values()
            .find(|i| {
                i.stack_id == *stack_id
                    && i.kind == kind
                    && i.status == DeploymentStatus::Completed
            })
            .cloned())
    }

    async fn get_active_integrations(
        &self,
        stack_id: &StackId,
        kind: IntegrationType,
    ) -> ServiceResult<Vec<IntegrationRecord>> {
        let integrations = self.integrations.read().map_err(|_| lock_err())?;
        Ok(integrations
            .values()
            .filter(|i| i.stack_id == *stack_id && i.kind == kind && i.status.is_active())
            .cloned()
            .collect())
    }

    async fn get_active_integrations_by_stack(
        &self,
        stack_id: &StackId,
    ) -> ServiceResult<Vec<IntegrationRecord>> {
        let integrations = self.integrations.read().map_err(|_| lock_err())?;
        let mut found: Vec<_> = integrations
            .values()
            .filter(|i| i.stack_id == *stack_id && i.status.is_active())
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn update_integration_status(
        &self,
        id: &IntegrationId,
        status: DeploymentStatus,
    ) -> ServiceResult<()> {
        let mut integrations = self.integrations.write().map_err(|_| lock_err())?;
        let integration = integrations
            .get_mut(id.as_str())
            .ok_or(ServiceError::NotFound("Integration"))?;
        integration.status = status;
        integration.reason = None;
        integration.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn update_integration_status_with_reason(
        &self,
        id: &IntegrationId,
        status: DeploymentStatus,
        reason: &str,
    ) -> ServiceResult<()> {
        let mut integrations = self.integrations.write().map_err(|_| lock_err())?;
        let integration = integrations
            .get_mut(id.as_str())
            .ok_or(ServiceError::NotFound("Integration"))?;
        integration.status = status;
        integration.reason = Some(reason.to_owned());
        integration.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn update_integration_config(
        &self,
        id: &IntegrationId,
        config: &Value,
    ) -> ServiceResult<()> {
        let mut integrations = self.integrations.write().map_err(|_| lock_err())?;
        let integration = integrations
            .get_mut(id.as_str())
            .ok_or(ServiceError::NotFound("Integration"))?;
        integration.config = Some(config.clone());
        integration.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn complete_integration(&self, id: &IntegrationId, info: &Value) -> ServiceResult<()> {
        let mut integrations = self.integrations.write().map_err(|_| lock_err())?;
        let integration = integrations
            .get_mut(id.as_str())
            .ok_or(ServiceError::NotFound("Integration"))?;
        integration.info = Some(info.clone());
        integration.status = DeploymentStatus::Completed;
        integration.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn update_all_integration_statuses(
        &self,
        stack_id: &StackId,
        status: DeploymentStatus,
    ) -> ServiceResult<()> {
        let mut integrations = self.integrations.write().map_err(|_| lock_err())?;
        for integration in integrations.values_mut() {
            if integration.stack_id == *stack_id {
                integration.status = status;
                integration.updated_at = chrono::Utc::now();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use thanos_sdk::Network;

    fn stack() -> StackRecord {
        let now = Utc::now();
        StackRecord {
            id: StackId::generate(),
            name: "Thanos".to_owned(),
            network: Network::Testnet,
            config: json!({"chainName": "Demo"}),
            deployment_path: "storage/deployments/Thanos/Testnet/x".to_owned(),
            metadata: StackMetadata::default(),
            status: StackStatus::Pending,
            reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn deployment(stack_id: &StackId, step: u32) -> DeploymentRecord {
        let now = Utc::now();
        DeploymentRecord {
            id: DeploymentId::generate(),
            stack_id: stack_id.clone(),
            step,
            status: DeploymentStatus::Pending,
            log_path: format!("storage/logs/{stack_id}/step-{step}/x_logs.txt"),
            config: json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    fn integration(stack_id: &StackId, kind: IntegrationType) -> IntegrationRecord {
        IntegrationRecord::new(
            stack_id.clone(),
            kind,
            DeploymentStatus::Pending,
            None,
            String::new(),
        )
    }

    #[tokio::test]
    async fn create_and_read_back() {
        let store = MemoryStore::new();
        let stack = stack();
        let id = stack.id.clone();
        let deployments = vec![deployment(&id, 1), deployment(&id, 2)];
        let integrations = vec![integration(&id, IntegrationType::Bridge)];

        store
            .create_stack(&stack, &deployments, &integrations)
            .await
            .expect("create");

        let loaded = store.get_stack(&id).await.expect("get").expect("present");
        assert_eq!(loaded.status, StackStatus::Pending);
        assert_eq!(loaded.name, "Thanos");

        let steps: Vec<u32> = store
            .get_deployments_by_stack(&id)
            .await
            .expect("deployments")
            .iter()
            .map(|d| d.step)
            .collect();
        assert_eq!(steps, vec![1, 2]);

        let active = store
            .get_active_integrations(&id, IntegrationType::Bridge)
            .await
            .expect("active");
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn deployments_sorted_by_step() {
        let store = MemoryStore::new();
        let stack = stack();
        let id = stack.id.clone();
        // Insert out of order.
        let deployments = vec![deployment(&id, 2), deployment(&id, 1)];
        store
            .create_stack(&stack, &deployments, &[])
            .await
            .expect("create");

        let steps: Vec<u32> = store
            .get_deployments_by_stack(&id)
            .await
            .expect("deployments")
            .iter()
            .map(|d| d.step)
            .collect();
        assert_eq!(steps, vec![1, 2]);
    }

    #[tokio::test]
    async fn status_reason_semantics() {
        let store = MemoryStore::new();
        let stack = stack();
        let id = stack.id.clone();
        store.create_stack(&stack, &[], &[]).await.expect("create");

        store
            .update_stack_status(&id, StackStatus::FailedToDeploy, "quota exceeded")
            .await
            .expect("update");
        let loaded = store.get_stack(&id).await.expect("get").expect("present");
        assert_eq!(loaded.status, StackStatus::FailedToDeploy);
        assert_eq!(loaded.reason.as_deref(), Some("quota exceeded"));

        // Empty reason clears the prior one.
        store
            .update_stack_status(&id, StackStatus::Deploying, "")
            .await
            .expect("update");
        let loaded = store.get_stack(&id).await.expect("get").expect("present");
        assert!(loaded.reason.is_none());
    }

    #[tokio::test]
    async fn absent_rows_are_none_but_updates_fail() {
        let store = MemoryStore::new();
        let missing = StackId::generate();

        assert!(store.get_stack(&missing).await.expect("get").is_none());
        assert!(store
            .get_stack_status(&missing)
            .await
            .expect("get")
            .is_none());

        let err = store
            .update_stack_status(&missing, StackStatus::Deploying, "")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn active_integration_filtering() {
        let store = MemoryStore::new();
        let stack = stack();
        let id = stack.id.clone();

        let mut failed = integration(&id, IntegrationType::Bridge);
        failed.status = DeploymentStatus::Failed;
        let mut terminated = integration(&id, IntegrationType::Bridge);
        terminated.status = DeploymentStatus::Terminated;
        let completed = integration(&id, IntegrationType::Bridge);

        store.create_stack(&stack, &[], &[]).await.expect("create");
        store.create_integration(&failed).await.expect("create");
        store.create_integration(&terminated).await.expect("create");
        store.create_integration(&completed).await.expect("create");
        store
            .complete_integration(&completed.id, &json!({"url": "https://b"}))
            .await
            .expect("complete");

        let active = store
            .get_active_integrations(&id, IntegrationType::Bridge)
            .await
            .expect("active");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, completed.id);
        assert_eq!(active[0].status, DeploymentStatus::Completed);
        assert_eq!(active[0].info.as_ref().expect("info")["url"], "https://b");
    }

    #[tokio::test]
    async fn installed_integration_requires_completed() {
        let store = MemoryStore::new();
        let stack = stack();
        let id = stack.id.clone();
        let pending = integration(&id, IntegrationType::Monitoring);
        store
            .create_stack(&stack, &[], std::slice::from_ref(&pending))
            .await
            .expect("create");

        assert!(store
            .get_installed_integration(&id, IntegrationType::Monitoring)
            .await
            .expect("get")
            .is_none());

        store
            .complete_integration(&pending.id, &json!({"url": "https://g"}))
            .await
            .expect("complete");

        let installed = store
            .get_installed_integration(&id, IntegrationType::Monitoring)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(installed.id, pending.id);
    }

    #[tokio::test]
    async fn integration_reason_and_config_updates() {
        let store = MemoryStore::new();
        let stack = stack();
        let id = stack.id.clone();
        let row = integration(&id, IntegrationType::BlockExplorer);
        store
            .create_stack(&stack, &[], std::slice::from_ref(&row))
            .await
            .expect("create");

        store
            .update_integration_status_with_reason(
                &row.id,
                DeploymentStatus::Failed,
                "helm release failed",
            )
            .await
            .expect("update");
        let loaded = store
            .get_integration(&row.id)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(loaded.status, DeploymentStatus::Failed);
        assert_eq!(loaded.reason.as_deref(), Some("helm release failed"));

        // A plain status update clears the reason.
        store
            .update_integration_status(&row.id, DeploymentStatus::Pending)
            .await
            .expect("update");
        let loaded = store
            .get_integration(&row.id)
            .await
            .expect("get")
            .expect("present");
        assert!(loaded.reason.is_none());

        store
            .update_integration_config(&row.id, &json!({"databaseUsername": "explorer"}))
            .await
            .expect("update config");
        let loaded = store
            .get_integration(&row.id)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(
            loaded.config.expect("config")["databaseUsername"],
            "explorer"
        );
    }

    #[tokio::test]
    async fn stack_wide_sweeps() {
        let store = MemoryStore::new();
        let stack = stack();
        let id = stack.id.clone();
        let deployments = vec![deployment(&id, 1), deployment(&id, 2)];
        let integrations = vec![
            integration(&id, IntegrationType::Bridge),
            integration(&id, IntegrationType::RegisterCandidate),
        ];
        store
            .create_stack(&stack, &deployments, &integrations)
            .await
            .expect("create");

        store
            .update_all_deployment_statuses(&id, DeploymentStatus::Terminated)
            .await
            .expect("sweep");
        store
            .update_all_integration_statuses(&id, DeploymentStatus::Terminated)
            .await
            .expect("sweep");

        for d in store
            .get_deployments_by_stack(&id)
            .await
            .expect("deployments")
        {
            assert_eq!(d.status, DeploymentStatus::Terminated);
        }
        assert!(store
            .get_active_integrations_by_stack(&id)
            .await
            .expect("active")
            .is_empty());
    }
}
