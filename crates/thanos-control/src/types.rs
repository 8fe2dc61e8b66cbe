//! Core types for the control service.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use thanos_sdk::Network;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing id.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a new unique id.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Parse an id from caller-supplied input, rejecting anything
            /// that is not a UUID.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s).map(|u| Self(u.to_string()))
            }

            /// Get the id as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

entity_id! {
    /// Unique identifier for a stack.
    StackId
}

entity_id! {
    /// Unique identifier for a deployment step.
    DeploymentId
}

entity_id! {
    /// Unique identifier for an integration.
    IntegrationId
}

/// Lifecycle status of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackStatus {
    /// Created, deploy job not yet started.
    Pending,
    /// Deploy job running.
    Deploying,
    /// Deploy job stopped by request.
    Stopped,
    /// All deployment steps completed.
    Deployed,
    /// Network settings update in flight.
    Updating,
    /// Terminate job running.
    Terminating,
    /// Infrastructure destroyed.
    Terminated,
    /// Deploy job failed; `reason` holds the error.
    FailedToDeploy,
    /// Network update failed; `reason` holds the error.
    FailedToUpdate,
    /// Terminate job failed; `reason` holds the error.
    FailedToTerminate,
    /// Unrecognised persisted value.
    Unknown,
}

impl StackStatus {
    /// Get the status name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Deploying => "Deploying",
            Self::Stopped => "Stopped",
            Self::Deployed => "Deployed",
            Self::Updating => "Updating",
            Self::Terminating => "Terminating",
            Self::Terminated => "Terminated",
            Self::FailedToDeploy => "FailedToDeploy",
            Self::FailedToUpdate => "FailedToUpdate",
            Self::FailedToTerminate => "FailedToTerminate",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether a terminate request is allowed in this status.
    ///
    /// Rejected while a deploy, update or terminate job may be in flight.
    #[must_use]
    pub const fn can_terminate(&self) -> bool {
        !matches!(self, Self::Deploying | Self::Updating | Self::Terminating)
    }

    /// Whether a resume request is allowed in this status.
    #[must_use]
    pub const fn can_resume(&self) -> bool {
        matches!(self, Self::Stopped | Self::FailedToDeploy | Self::Terminated)
    }

    /// Whether this is a failure status that must carry a reason.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::FailedToDeploy | Self::FailedToUpdate | Self::FailedToTerminate
        )
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StackStatus {
    type Err = std::convert::Infallible;

    /// Unrecognised values decode as [`StackStatus::Unknown`] so that a
    /// schema drift cannot make rows unreadable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Pending" => Self::Pending,
            "Deploying" => Self::Deploying,
            "Stopped" => Self::Stopped,
            "Deployed" => Self::Deployed,
            "Updating" => Self::Updating,
            "Terminating" => Self::Terminating,
            "Terminated" => Self::Terminated,
            "FailedToDeploy" => Self::FailedToDeploy,
            "FailedToUpdate" => Self::FailedToUpdate,
            "FailedToTerminate" => Self::FailedToTerminate,
            _ => Self::Unknown,
        })
    }
}

/// Lifecycle status of a deployment step. Integrations reuse the same
/// vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStatus {
    /// Not yet started.
    Pending,
    /// Currently executing.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Interrupted by a stop request.
    Stopped,
    /// Uninstall in flight (integrations only).
    Terminating,
    /// Removed along with the stack.
    Terminated,
    /// Unrecognised persisted value.
    Unknown,
}

impl DeploymentStatus {
    /// Get the status name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Stopped => "Stopped",
            Self::Terminating => "Terminating",
            Self::Terminated => "Terminated",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether an integration in this status counts as active.
    ///
    /// At most one active integration may exist per (stack, type); failed
    /// and terminated ones may accumulate historically.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Pending | Self::InProgress | Self::Completed | Self::Terminating
        )
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeploymentStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Pending" => Self::Pending,
            "InProgress" => Self::InProgress,
            "Completed" => Self::Completed,
            "Failed" => Self::Failed,
            "Stopped" => Self::Stopped,
            "Terminating" => Self::Terminating,
            "Terminated" => Self::Terminated,
            _ => Self::Unknown,
        })
    }
}

/// Optional add-on services attachable to a live stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntegrationType {
    /// Token bridge front-end.
    Bridge,
    /// Block explorer.
    BlockExplorer,
    /// Grafana-based monitoring.
    Monitoring,
    /// DAO candidate registration.
    RegisterCandidate,
}

impl IntegrationType {
    /// Canonical persisted identifier, also used in routes and task ids.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bridge => "bridge",
            Self::BlockExplorer => "block-explorer",
            Self::Monitoring => "monitoring",
            Self::RegisterCandidate => "register-candidate",
        }
    }

    /// Human-readable name for guard messages.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Bridge => "bridge",
            Self::BlockExplorer => "block explorer",
            Self::Monitoring => "monitoring",
            Self::RegisterCandidate => "register candidate",
        }
    }
}

impl fmt::Display for IntegrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IntegrationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bridge" => Ok(Self::Bridge),
            "block-explorer" => Ok(Self::BlockExplorer),
            "monitoring" => Ok(Self::Monitoring),
            "register-candidate" => Ok(Self::RegisterCandidate),
            other => Err(format!("unknown integration type: {other}")),
        }
    }
}

/// Public endpoints recorded on a stack once known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackMetadata {
    /// L2 execution RPC endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub l2_url: Option<String>,
    /// Bridge front-end URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_url: Option<String>,
    /// Block explorer URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_explorer_url: Option<String>,
    /// Monitoring dashboard URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring_url: Option<String>,
}

impl StackMetadata {
    /// Set or clear the URL slot an integration type mirrors into.
    ///
    /// Candidate registration has no URL slot; the call is a no-op.
    pub fn set_integration_url(&mut self, kind: IntegrationType, url: Option<String>) {
        match kind {
            IntegrationType::Bridge => self.bridge_url = url,
            IntegrationType::BlockExplorer => self.block_explorer_url = url,
            IntegrationType::Monitoring => self.monitoring_url = url,
            IntegrationType::RegisterCandidate => {}
        }
    }
}

/// A stack row: one managed rollup environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackRecord {
    /// Unique stack identifier.
    pub id: StackId,
    /// Stack family name; always `"Thanos"`.
    pub name: String,
    /// Target network.
    pub network: Network,
    /// Original deploy request, persisted verbatim (operator keys trimmed).
    pub config: Value,
    /// Deployment artifact directory. Immutable once created.
    pub deployment_path: String,
    /// Public endpoints, filled in as they become known.
    pub metadata: StackMetadata,
    /// Current lifecycle status.
    pub status: StackStatus,
    /// Failure reason; non-empty exactly when `status` is a failure variant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A deployment row: one ordered step of a stack's creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Unique deployment identifier.
    pub id: DeploymentId,
    /// Owning stack.
    pub stack_id: StackId,
    /// Execution order within the stack, starting at 1.
    pub step: u32,
    /// Current status.
    pub status: DeploymentStatus,
    /// SDK log file for this step.
    pub log_path: String,
    /// Step-specific subset of the stack config.
    pub config: Value,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last updated.
    pub updated_at: DateTime<Utc>,
}

/// An integration row: one optional add-on bound to a stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationRecord {
    /// Unique integration identifier.
    pub id: IntegrationId,
    /// Owning stack.
    pub stack_id: StackId,
    /// Add-on type.
    #[serde(rename = "type")]
    pub kind: IntegrationType,
    /// Current status (deployment vocabulary).
    pub status: DeploymentStatus,
    /// Failure reason, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Install-time configuration, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    /// Result written on completion, typically `{"url": ...}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
    /// SDK log file for the install action.
    pub log_path: String,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last updated.
    pub updated_at: DateTime<Utc>,
}

impl IntegrationRecord {
    /// Build a fresh integration row for a stack.
    #[must_use]
    pub fn new(
        stack_id: StackId,
        kind: IntegrationType,
        status: DeploymentStatus,
        config: Option<Value>,
        log_path: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: IntegrationId::generate(),
            stack_id,
            kind,
            status,
            reason: None,
            config,
            info: None,
            log_path,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_uuids() {
        let id = StackId::generate();
        assert!(StackId::parse(id.as_str()).is_ok());
        assert!(StackId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn stack_status_round_trip() {
        for status in [
            StackStatus::Pending,
            StackStatus::Deploying,
            StackStatus::Stopped,
            StackStatus::Deployed,
            StackStatus::Updating,
            StackStatus::Terminating,
            StackStatus::Terminated,
            StackStatus::FailedToDeploy,
            StackStatus::FailedToUpdate,
            StackStatus::FailedToTerminate,
        ] {
            let parsed: StackStatus = status.as_str().parse().expect("infallible");
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn unknown_status_decodes_as_unknown() {
        let parsed: StackStatus = "Exploded".parse().expect("infallible");
        assert_eq!(parsed, StackStatus::Unknown);
        let parsed: DeploymentStatus = "Exploded".parse().expect("infallible");
        assert_eq!(parsed, DeploymentStatus::Unknown);
    }

    #[test]
    fn terminate_guard() {
        assert!(!StackStatus::Deploying.can_terminate());
        assert!(!StackStatus::Updating.can_terminate());
        assert!(!StackStatus::Terminating.can_terminate());
        assert!(StackStatus::Deployed.can_terminate());
        assert!(StackStatus::Stopped.can_terminate());
        assert!(StackStatus::FailedToDeploy.can_terminate());
        assert!(StackStatus::FailedToUpdate.can_terminate());
        assert!(StackStatus::Terminated.can_terminate());
        assert!(StackStatus::FailedToTerminate.can_terminate());
    }

    #[test]
    fn resume_guard() {
        assert!(StackStatus::Stopped.can_resume());
        assert!(StackStatus::FailedToDeploy.can_resume());
        assert!(StackStatus::Terminated.can_resume());
        assert!(!StackStatus::Deployed.can_resume());
        assert!(!StackStatus::Deploying.can_resume());
        assert!(!StackStatus::Pending.can_resume());
    }

    #[test]
    fn active_integration_statuses() {
        assert!(DeploymentStatus::Pending.is_active());
        assert!(DeploymentStatus::InProgress.is_active());
        assert!(DeploymentStatus::Completed.is_active());
        assert!(DeploymentStatus::Terminating.is_active());
        assert!(!DeploymentStatus::Failed.is_active());
        assert!(!DeploymentStatus::Terminated.is_active());
        assert!(!DeploymentStatus::Stopped.is_active());
    }

    #[test]
    fn integration_type_strings() {
        assert_eq!(IntegrationType::BlockExplorer.as_str(), "block-explorer");
        assert_eq!(IntegrationType::BlockExplorer.display_name(), "block explorer");
        assert_eq!(
            "register-candidate".parse::<IntegrationType>().expect("parse"),
            IntegrationType::RegisterCandidate
        );
    }

    #[test]
    fn metadata_url_slots() {
        let mut metadata = StackMetadata::default();
        metadata.set_integration_url(IntegrationType::Bridge, Some("https://b".to_owned()));
        assert_eq!(metadata.bridge_url.as_deref(), Some("https://b"));
        metadata.set_integration_url(IntegrationType::Bridge, None);
        assert!(metadata.bridge_url.is_none());

        // No slot for candidate registration.
        metadata.set_integration_url(IntegrationType::RegisterCandidate, Some("x".to_owned()));
        assert_eq!(metadata, StackMetadata::default());
    }

    #[test]
    fn metadata_serialises_camel_case() {
        let metadata = StackMetadata {
            l2_url: Some("https://rpc".to_owned()),
            bridge_url: Some("https://bridge".to_owned()),
            block_explorer_url: None,
            monitoring_url: None,
        };
        let json = serde_json::to_value(&metadata).expect("serialize");
        assert_eq!(json["l2Url"], "https://rpc");
        assert_eq!(json["bridgeUrl"], "https://bridge");
        assert!(json.get("blockExplorerUrl").is_none());
    }
}
