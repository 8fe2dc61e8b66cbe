//! SDK seam consumed by the orchestrator.
//!
//! The orchestrator never talks to the deployment tooling directly: it asks
//! an [`SdkConnector`] for a per-action [`StackSdk`] client bound to a log
//! file and a cancellation token, and drives that. Production wiring uses
//! [`CliSdk`] (the thanos-sdk crate); tests use [`MockSdk`].

mod mock;

pub use mock::{MockBehaviour, MockOp, MockSdk};

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use thanos_sdk::{
    AwsCredentials, CandidateParams, ChainInformation, ClientOptions, DeployContractsParams,
    DeployInfraParams, Network, SdkClient, SdkResult, UpdateNetworkParams,
};

/// Options for binding a client to one stack action.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Cancellation token of the job driving the client.
    pub cancel: CancellationToken,
    /// Append-only log file for the action.
    pub log_path: PathBuf,
    /// Target network.
    pub network: Network,
    /// Stack deployment artifact directory.
    pub deployment_path: String,
    /// Whether the stack opted into candidate registration.
    pub register_candidate: bool,
    /// AWS credentials from the original deploy request.
    pub aws: AwsCredentials,
}

/// Factory for per-action SDK clients plus the stateless validation probes.
#[async_trait]
pub trait SdkConnector: Send + Sync {
    /// Bind a client to one stack action.
    async fn connect(&self, options: ConnectOptions) -> SdkResult<Box<dyn StackSdk>>;

    /// Chain id reported by the L1 RPC endpoint.
    async fn chain_id(&self, l1_rpc_url: &str) -> SdkResult<u64>;

    /// Whether the URL answers as an L1 execution RPC endpoint.
    async fn is_valid_l1_rpc(&self, url: &str) -> bool;

    /// Whether the URL answers as a beacon-chain endpoint.
    async fn is_valid_beacon_url(&self, url: &str) -> bool;

    /// Whether the credentials can access the requested region.
    async fn is_available_region(&self, aws: &AwsCredentials) -> bool;
}

/// Operations available on a bound client. Every long-running call honours
/// the client's cancellation token and reports cancellation as a
/// distinguishable failure.
#[async_trait]
pub trait StackSdk: Send {
    /// Deploy the L1 contract suite.
    async fn deploy_l1_contracts(&mut self, params: &DeployContractsParams) -> SdkResult<()>;

    /// Provision the AWS infrastructure.
    async fn deploy_aws_infrastructure(&mut self, params: &DeployInfraParams) -> SdkResult<()>;

    /// Tear down the AWS infrastructure.
    async fn destroy_aws_infrastructure(&mut self) -> SdkResult<()>;

    /// Fetch the public endpoints of the deployed stack.
    async fn show_chain_information(&mut self) -> SdkResult<ChainInformation>;

    /// Install the bridge front-end; returns its URL.
    async fn install_bridge(&mut self) -> SdkResult<String>;

    /// Remove the bridge front-end.
    async fn uninstall_bridge(&mut self) -> SdkResult<()>;

    /// Install the block explorer; returns its URL.
    async fn install_block_explorer(&mut self, config: &Value) -> SdkResult<String>;

    /// Remove the block explorer.
    async fn uninstall_block_explorer(&mut self) -> SdkResult<()>;

    /// Render the monitoring stack configuration.
    async fn get_monitoring_config(&mut self, grafana_password: &str) -> SdkResult<Value>;

    /// Install the monitoring stack; returns the dashboard URL.
    async fn install_monitoring(&mut self, config: &Value) -> SdkResult<String>;

    /// Remove the monitoring stack.
    async fn uninstall_monitoring(&mut self) -> SdkResult<()>;

    /// Apply new network settings to the running stack.
    async fn update_network(&mut self, params: &UpdateNetworkParams) -> SdkResult<()>;

    /// Submit the candidate registration transaction.
    async fn verify_register_candidates(&mut self, params: &CandidateParams) -> SdkResult<()>;

    /// Fetch the registration details written on-chain.
    async fn get_registration_additional_info(
        &mut self,
        params: &CandidateParams,
    ) -> SdkResult<Value>;
}

/// Production connector backed by the external `trh-sdk` tool.
#[derive(Debug, Default, Clone)]
pub struct CliSdk;

impl CliSdk {
    /// Create a new CLI-backed connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SdkConnector for CliSdk {
    async fn connect(&self, options: ConnectOptions) -> SdkResult<Box<dyn StackSdk>> {
        let client = SdkClient::connect(ClientOptions {
            cancel: options.cancel,
            log_path: options.log_path,
            network: options.network,
            deployment_path: PathBuf::from(options.deployment_path),
            register_candidate: options.register_candidate,
            aws: options.aws,
            program: None,
        })
        .await?;
        Ok(Box::new(CliClient(client)))
    }

    async fn chain_id(&self, l1_rpc_url: &str) -> SdkResult<u64> {
        thanos_sdk::probe::chain_id(l1_rpc_url).await
    }

    async fn is_valid_l1_rpc(&self, url: &str) -> bool {
        thanos_sdk::probe::is_valid_l1_rpc(url).await
    }

    async fn is_valid_beacon_url(&self, url: &str) -> bool {
        thanos_sdk::probe::is_valid_beacon_url(url).await
    }

    async fn is_available_region(&self, aws: &AwsCredentials) -> bool {
        thanos_sdk::probe::is_available_region(aws).await
    }
}

struct CliClient(SdkClient);

#[async_trait]
impl StackSdk for CliClient {
    async fn deploy_l1_contracts(&mut self, params: &DeployContractsParams) -> SdkResult<()> {
        self.0.deploy_l1_contracts(params).await
    }

    async fn deploy_aws_infrastructure(&mut self, params: &DeployInfraParams) -> SdkResult<()> {
        self.0.deploy_aws_infrastructure(params).await
    }

    async fn destroy_aws_infrastructure(&mut self) -> SdkResult<()> {
        self.0.destroy_aws_infrastructure().await
    }

    async fn show_chain_information(&mut self) -> SdkResult<ChainInformation> {
        self.0.show_chain_information().await
    }

    async fn install_bridge(&mut self) -> SdkResult<String> {
        self.0.install_bridge().await
    }

    async fn uninstall_bridge(&mut self) -> SdkResult<()> {
        self.0.uninstall_bridge().await
    }

    async fn install_block_explorer(&mut self, config: &Value) -> SdkResult<String> {
        self.0.install_block_explorer(config).await
    }

    async fn uninstall_block_explorer(&mut self) -> SdkResult<()> {
        self.0.uninstall_block_explorer().await
    }

    async fn get_monitoring_config(&mut self, grafana_password: &str) -> SdkResult<Value> {
        self.0.get_monitoring_config(grafana_password).await
    }

    async fn install_monitoring(&mut self, config: &Value) -> SdkResult<String> {
        self.0.install_monitoring(config).await
    }

    async fn uninstall_monitoring(&mut self) -> SdkResult<()> {
        self.0.uninstall_monitoring().await
    }

    async fn update_network(&mut self, params: &UpdateNetworkParams) -> SdkResult<()> {
        self.0.update_network(params).await
    }

    async fn verify_register_candidates(&mut self, params: &CandidateParams) -> SdkResult<()> {
        self.0.verify_register_candidates(params).await
    }

    async fn get_registration_additional_info(
        &mut self,
        params: &CandidateParams,
    ) -> SdkResult<Value> {
        self.0.get_registration_additional_info(params).await
    }
}
