//! PostgreSQL store implementation.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::error::{ServiceError, ServiceResult};
use crate::types::{
    DeploymentId, DeploymentRecord, DeploymentStatus, IntegrationId, IntegrationRecord,
    IntegrationType, StackId, StackMetadata, StackRecord, StackStatus,
};

use super::Store;

/// Statuses that count as active for integration queries.
const ACTIVE_STATUSES: [&str; 4] = ["Pending", "InProgress", "Completed", "Terminating"];

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and create the store.
    ///
    /// The required tables are created if they don't exist.
    pub async fn new(url: &str) -> ServiceResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create a store from an existing connection pool.
    pub async fn from_pool(pool: PgPool) -> ServiceResult<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> ServiceResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stacks (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                network TEXT NOT NULL,
                config JSONB NOT NULL,
                deployment_path TEXT NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
                status TEXT NOT NULL,
                reason TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                deleted_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS deployments (
                id TEXT PRIMARY KEY,
                stack_id TEXT NOT NULL REFERENCES stacks(id) ON DELETE CASCADE,
                step INTEGER NOT NULL,
                status TEXT NOT NULL,
                log_path TEXT NOT NULL,
                config JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                deleted_at TIMESTAMPTZ,
                UNIQUE (stack_id, step)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS integrations (
                id TEXT PRIMARY KEY,
                stack_id TEXT NOT NULL REFERENCES stacks(id) ON DELETE CASCADE,
                type TEXT NOT NULL,
                status TEXT NOT NULL,
                reason TEXT,
                config JSONB,
                info JSONB,
                log_path TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                deleted_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_deployments_stack ON deployments (stack_id, step)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_integrations_stack ON integrations (stack_id, type)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_stack(row: &PgRow) -> ServiceResult<StackRecord> {
        let network: String = row.get("network");
        let status: String = row.get("status");
        let metadata: Value = row.get("metadata");

        Ok(StackRecord {
            id: StackId::new(row.get::<String, _>("id")),
            name: row.get("name"),
            network: network
                .parse()
                .map_err(|e: thanos_sdk::SdkError| ServiceError::Serialisation(e.to_string()))?,
            config: row.get("config"),
            deployment_path: row.get("deployment_path"),
            metadata: serde_json::from_value(metadata)?,
            status: status.parse().unwrap_or(StackStatus::Unknown),
            reason: row.get("reason"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn row_to_deployment(row: &PgRow) -> ServiceResult<DeploymentRecord> {
        let status: String = row.get("status");
        let step: i32 = row.get("step");

        Ok(DeploymentRecord {
            id: DeploymentId::new(row.get::<String, _>("id")),
            stack_id: StackId::new(row.get::<String, _>("stack_id")),
            step: u32::try_from(step)
                .map_err(|_| ServiceError::Serialisation(format!("negative step: {step}")))?,
            status: status.parse().unwrap_or(DeploymentStatus::Unknown),
            log_path: row.get("log_path"),
            config: row.get("config"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn row_to_integration(row: &PgRow) -> ServiceResult<IntegrationRecord> {
        let status: String = row.get("status");
        let kind: String = row.get("type");

        Ok(IntegrationRecord {
            id: IntegrationId::new(row.get::<String, _>("id")),
            stack_id: StackId::new(row.get::<String, _>("stack_id")),
            kind: kind
                .parse()
                .map_err(ServiceError::Serialisation)?,
            status: status.parse().unwrap_or(DeploymentStatus::Unknown),
            reason: row.get("reason"),
            config: row.get("config"),
            info: row.get("info"),
            log_path: row.get("log_path"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn affected(result: sqlx::postgres::PgQueryResult, entity: &'static str) -> ServiceResult<()> {
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound(entity));
        }
        Ok(())
    }
}

const STACK_COLUMNS: &str = "id, name, network, config, deployment_path, metadata, status, \
                             reason, created_at, updated_at";
const DEPLOYMENT_COLUMNS: &str =
    "id, stack_id, step, status, log_path, config, created_at, updated_at";
const INTEGRATION_COLUMNS: &str =
    "id, stack_id, type, status, reason, config, info, log_path, created_at, updated_at";

#[async_trait]
impl Store for PostgresStore {
    async fn create_stack(
        &self,
        stack: &StackRecord,
        deployments: &[DeploymentRecord],
        integrations: &[IntegrationRecord],
    ) -> ServiceResult<()> {
        let metadata = serde_json::to_value(&stack.metadata)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO stacks (
                id, name, network, config, deployment_path, metadata,
                status, reason, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(stack.id.as_str())
        .bind(&stack.name)
        .bind(stack.network.as_str())
        .bind(&stack.config)
        .bind(&stack.deployment_path)
        .bind(&metadata)
        .bind(stack.status.as_str())
        .bind(&stack.reason)
        .bind(stack.created_at)
        .bind(stack.updated_at)
        .execute(&mut *tx)
        .await?;

        for deployment in deployments {
            let step = i32::try_from(deployment.step)
                .map_err(|_| ServiceError::internal("deployment step out of range"))?;
            sqlx::query(
                r#"
                INSERT INTO deployments (
                    id, stack_id, step, status, log_path, config, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(deployment.id.as_str())
            .bind(deployment.stack_id.as_str())
            .bind(step)
            .bind(deployment.status.as_str())
            .bind(&deployment.log_path)
            .bind(&deployment.config)
            .bind(deployment.created_at)
            .bind(deployment.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        for integration in integrations {
            sqlx::query(
                r#"
                INSERT INTO integrations (
                    id, stack_id, type, status, reason, config, info,
                    log_path, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(integration.id.as_str())
            .bind(integration.stack_id.as_str())
            .bind(integration.kind.as_str())
            .bind(integration.status.as_str())
            .bind(&integration.reason)
            .bind(&integration.config)
            .bind(&integration.info)
            .bind(&integration.log_path)
            .bind(integration.created_at)
            .bind(integration.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_stack(&self, id: &StackId) -> ServiceResult<Option<StackRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {STACK_COLUMNS} FROM stacks WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_stack).transpose()
    }

    async fn get_all_stacks(&self) -> ServiceResult<Vec<StackRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {STACK_COLUMNS} FROM stacks WHERE deleted_at IS NULL \
             ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_stack).collect()
    }

    async fn get_stack_status(&self, id: &StackId) -> ServiceResult<Option<StackStatus>> {
        let row =
            sqlx::query("SELECT status FROM stacks WHERE id = $1 AND deleted_at IS NULL")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|r| {
            r.get::<String, _>("status")
                .parse()
                .unwrap_or(StackStatus::Unknown)
        }))
    }

    async fn update_stack_status(
        &self,
        id: &StackId,
        status: StackStatus,
        reason: &str,
    ) -> ServiceResult<()> {
        let reason = (!reason.is_empty()).then_some(reason);
        let result = sqlx::query(
            "UPDATE stacks SET status = $1, reason = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(status.as_str())
        .bind(reason)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Self::affected(result, "Stack")
    }

    async fn update_stack_metadata(
        &self,
        id: &StackId,
        metadata: &StackMetadata,
    ) -> ServiceResult<()> {
        let metadata = serde_json::to_value(metadata)?;
        let result = sqlx::query(
            "UPDATE stacks SET metadata = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(&metadata)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Self::affected(result, "Stack")
    }

    async fn get_deployments_by_stack(
        &self,
        stack_id: &StackId,
    ) -> ServiceResult<Vec<DeploymentRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {DEPLOYMENT_COLUMNS} FROM deployments \
             WHERE stack_id = $1 AND deleted_at IS NULL ORDER BY step ASC"
        ))
        .bind(stack_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_deployment).collect()
    }

    async fn get_deployment(&self, id: &DeploymentId) -> ServiceResult<Option<DeploymentRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {DEPLOYMENT_COLUMNS} FROM deployments \
             WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_deployment).transpose()
    }

    async fn get_deployment_status(
        &self,
        id: &DeploymentId,
    ) -> ServiceResult<Option<DeploymentStatus>> {
        let row =
            sqlx::query("SELECT status FROM deployments WHERE id = $1 AND deleted_at IS NULL")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|r| {
            r.get::<String, _>("status")
                .parse()
                .unwrap_or(DeploymentStatus::Unknown)
        }))
    }

    async fn update_deployment_status(
        &self,
        id: &DeploymentId,
        status: DeploymentStatus,
    ) -> ServiceResult<()> {
        let result = sqlx::query(
            "UPDATE deployments SET status = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(status.as_str())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Self::affected(result, "Deployment")
    }

    async fn update_all_deployment_statuses(
        &self,
        stack_id: &StackId,
        status: DeploymentStatus,
    ) -> ServiceResult<()> {
        sqlx::query(
            "UPDATE deployments SET status = $1, updated_at = NOW() WHERE stack_id = $2",
        )
        .bind(status.as_str())
        .bind(stack_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_integration(&self, integration: &IntegrationRecord) -> ServiceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO integrations (
                id, stack_id, type, status, reason, config, info,
                log_path, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(integration.id.as_str())
        .bind(integration.stack_id.as_str())
        .bind(integration.kind.as_str())
        .bind(integration.status.as_str())
        .bind(&integration.reason)
        .bind(&integration.config)
        .bind(&integration.info)
        .bind(&integration.log_path)
        .bind(integration.created_at)
        .bind(integration.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_integration(
        &self,
        id: &IntegrationId,
    ) -> ServiceResult<Option<IntegrationRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {INTEGRATION_COLUMNS} FROM integrations \
             WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_integration).transpose()
    }

    async fn get_integration_by_type(
        &self,
        stack_id: &StackId,
        kind: IntegrationType,
    ) -> ServiceResult<Option<IntegrationRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {INTEGRATION_COLUMNS} FROM integrations \
             WHERE stack_id = $1 AND type = $2 AND deleted_at IS NULL \
             ORDER BY created_at ASC LIMIT 1"
        ))
        .bind(stack_id.as_str())
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_integration).transpose()
    }

    async fn get_installed_integration(
        &self,
        stack_id: &StackId,
        kind: IntegrationType,
    ) -> ServiceResult<Option<IntegrationRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {INTEGRATION_COLUMNS} FROM integrations \
             WHERE stack_id = $1 AND type = $2 AND status = 'Completed' \
             AND deleted_at IS NULL LIMIT 1"
        ))
        .bind(stack_id.as_str())
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_integration).transpose()
    }

    async fn get_active_integrations(
        &self,
        stack_id: &StackId,
        kind: IntegrationType,
    ) -> ServiceResult<Vec<IntegrationRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {INTEGRATION_COLUMNS} FROM integrations \
             WHERE stack_id = $1 AND type = $2 AND status = ANY($3) \
             AND deleted_at IS NULL"
        ))
        .bind(stack_id.as_str())
        .bind(kind.as_str())
        .bind(&ACTIVE_STATUSES[..])
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_integration).collect()
    }

    async fn get_active_integrations_by_stack(
        &self,
        stack_id: &StackId,
    ) -> ServiceResult<Vec<IntegrationRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {INTEGRATION_COLUMNS} FROM integrations \
             WHERE stack_id = $1 AND status = ANY($2) AND deleted_at IS NULL \
             ORDER BY created_at ASC"
        ))
        .bind(stack_id.as_str())
        .bind(&ACTIVE_STATUSES[..])
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_integration).collect()
    }

    async fn update_integration_status(
        &self,
        id: &IntegrationId,
        status: DeploymentStatus,
    ) -> ServiceResult<()> {
        let result = sqlx::query(
            "UPDATE integrations SET status = $1, reason = NULL, updated_at = NOW() \
             WHERE id = $2",
        )
        .bind(status.as_str())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Self::affected(result, "Integration")
    }

    async fn update_integration_status_with_reason(
        &self,
        id: &IntegrationId,
        status: DeploymentStatus,
        reason: &str,
    ) -> ServiceResult<()> {
        let result = sqlx::query(
            "UPDATE integrations SET status = $1, reason = $2, updated_at = NOW() \
             WHERE id = $3",
        )
        .bind(status.as_str())
        .bind(reason)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Self::affected(result, "Integration")
    }

    async fn update_integration_config(
        &self,
        id: &IntegrationId,
        config: &Value,
    ) -> ServiceResult<()> {
        let result = sqlx::query(
            "UPDATE integrations SET config = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(config)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Self::affected(result, "Integration")
    }

    async fn complete_integration(&self, id: &IntegrationId, info: &Value) -> ServiceResult<()> {
        let result = sqlx::query(
            "UPDATE integrations SET info = $1, status = 'Completed', updated_at = NOW() \
             WHERE id = $2",
        )
        .bind(info)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Self::affected(result, "Integration")
    }

    async fn update_all_integration_statuses(
        &self,
        stack_id: &StackId,
        status: DeploymentStatus,
    ) -> ServiceResult<()> {
        sqlx::query(
            "UPDATE integrations SET status = $1, updated_at = NOW() WHERE stack_id = $2",
        )
        .bind(status.as_str())
        .bind(stack_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore").finish_non_exhaustive()
    }
}
