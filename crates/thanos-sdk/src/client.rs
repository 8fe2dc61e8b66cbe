//! Per-action SDK client.
//!
//! A client is created for exactly one action against one stack: it carries
//! the action's log file, the stack's deployment path and credentials, and
//! the cancellation token of the job driving it. Operations map one-to-one
//! onto `trh-sdk` subcommands.

use std::path::PathBuf;

use serde_json::Value;
use tokio::fs::File;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{SdkError, SdkResult};
use crate::process::{open_log, run_logged};
use crate::types::{
    AwsCredentials, CandidateParams, ChainInformation, DeployContractsParams, DeployInfraParams,
    Network, UpdateNetworkParams,
};

/// Default name of the external tool; resolved through `PATH`.
pub const DEFAULT_PROGRAM: &str = "trh-sdk";

/// Options for binding a client to one stack action.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Cancellation token of the job driving this client.
    pub cancel: CancellationToken,
    /// Append-only log file for the action.
    pub log_path: PathBuf,
    /// Target network.
    pub network: Network,
    /// Stack deployment artifact directory.
    pub deployment_path: PathBuf,
    /// Whether the stack opted into candidate registration.
    pub register_candidate: bool,
    /// AWS credentials from the original deploy request.
    pub aws: AwsCredentials,
    /// Override for the tool binary name.
    pub program: Option<String>,
}

/// Client bound to one stack action.
pub struct SdkClient {
    options: ClientOptions,
    program: String,
    log: File,
}

impl SdkClient {
    /// Bind a client, initialising the append-only log file at
    /// `options.log_path`.
    pub async fn connect(options: ClientOptions) -> SdkResult<Self> {
        if options.aws.region.is_empty() {
            return Err(SdkError::BadConfig("AWS region is empty".to_owned()));
        }
        let log = open_log(&options.log_path).await?;
        let program = options
            .program
            .clone()
            .unwrap_or_else(|| DEFAULT_PROGRAM.to_owned());
        info!(
            network = %options.network,
            log_path = %options.log_path.display(),
            "SDK client initialised"
        );
        Ok(Self {
            options,
            program,
            log,
        })
    }

    fn command(&self, subcommand: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(subcommand);
        cmd.arg("--network").arg(self.options.network.as_str());
        cmd.arg("--deployment-path").arg(&self.options.deployment_path);
        cmd.env("AWS_ACCESS_KEY_ID", &self.options.aws.access_key);
        cmd.env("AWS_SECRET_ACCESS_KEY", &self.options.aws.secret_key);
        cmd.env("AWS_REGION", &self.options.aws.region);
        cmd
    }

    async fn run(&mut self, op: &'static str, cmd: Command) -> SdkResult<String> {
        let cancel = self.options.cancel.clone();
        let output = run_logged(op, cmd, &mut self.log, &cancel).await?;
        Ok(output.stdout_string())
    }

    /// Run an operation whose stdout must be a single non-empty line.
    async fn run_expecting_line(&mut self, op: &'static str, cmd: Command) -> SdkResult<String> {
        let out = self.run(op, cmd).await?;
        let line = out.lines().last().unwrap_or("").trim().to_owned();
        if line.is_empty() {
            return Err(SdkError::EmptyOutput { op });
        }
        Ok(line)
    }

    /// Run an operation whose stdout is a JSON document.
    async fn run_expecting_json(&mut self, op: &'static str, cmd: Command) -> SdkResult<Value> {
        let out = self.run(op, cmd).await?;
        if out.is_empty() {
            return Err(SdkError::EmptyOutput { op });
        }
        serde_json::from_str(&out).map_err(|e| SdkError::Parse(format!("{op}: {e}")))
    }

    /// Deploy the L1 contract suite.
    pub async fn deploy_l1_contracts(&mut self, params: &DeployContractsParams) -> SdkResult<()> {
        let mut cmd = self.command(&["deploy", "contracts"]);
        cmd.arg("--l1-rpc-url").arg(&params.l1_rpc_url);
        let cfg = &params.chain_configuration;
        cmd.arg("--l2-block-time").arg(cfg.l2_block_time.to_string());
        cmd.arg("--batch-submission-frequency")
            .arg(cfg.batch_submission_frequency.to_string());
        cmd.arg("--output-root-frequency")
            .arg(cfg.output_root_frequency.to_string());
        cmd.arg("--challenge-period")
            .arg(cfg.challenge_period.to_string());
        // Operator keys go through the environment, never argv.
        cmd.env("THANOS_ADMIN_KEY", &params.admin_key);
        cmd.env("THANOS_SEQUENCER_KEY", &params.sequencer_key);
        cmd.env("THANOS_BATCHER_KEY", &params.batcher_key);
        cmd.env("THANOS_PROPOSER_KEY", &params.proposer_key);

        self.run("deploy-l1-contracts", cmd).await.map(|_| ())
    }

    /// Provision the AWS infrastructure for the stack.
    pub async fn deploy_aws_infrastructure(&mut self, params: &DeployInfraParams) -> SdkResult<()> {
        let mut cmd = self.command(&["deploy", "infra"]);
        cmd.arg("--chain-name").arg(&params.chain_name);
        cmd.arg("--l1-beacon-url").arg(&params.l1_beacon_url);
        self.run("deploy-aws-infra", cmd).await.map(|_| ())
    }

    /// Tear down the stack's AWS infrastructure.
    pub async fn destroy_aws_infrastructure(&mut self) -> SdkResult<()> {
        let cmd = self.command(&["destroy", "infra"]);
        self.run("destroy-aws-infra", cmd).await.map(|_| ())
    }

    /// Fetch the public endpoints of the deployed stack.
    pub async fn show_chain_information(&mut self) -> SdkResult<ChainInformation> {
        let cmd = self.command(&["info", "--json"]);
        let value = self.run_expecting_json("show-chain-information", cmd).await?;
        serde_json::from_value(value).map_err(|e| SdkError::Parse(e.to_string()))
    }

    /// Install the bridge front-end; returns its URL.
    pub async fn install_bridge(&mut self) -> SdkResult<String> {
        let cmd = self.command(&["plugin", "install", "bridge"]);
        self.run_expecting_line("install-bridge", cmd).await
    }

    /// Remove the bridge front-end.
    pub async fn uninstall_bridge(&mut self) -> SdkResult<()> {
        let cmd = self.command(&["plugin", "uninstall", "bridge"]);
        self.run("uninstall-bridge", cmd).await.map(|_| ())
    }

    /// Install the block explorer; returns its URL.
    pub async fn install_block_explorer(&mut self, config: &Value) -> SdkResult<String> {
        let mut cmd = self.command(&["plugin", "install", "block-explorer"]);
        cmd.arg("--config").arg(config.to_string());
        self.run_expecting_line("install-block-explorer", cmd).await
    }

    /// Remove the block explorer.
    pub async fn uninstall_block_explorer(&mut self) -> SdkResult<()> {
        let cmd = self.command(&["plugin", "uninstall", "block-explorer"]);
        self.run("uninstall-block-explorer", cmd).await.map(|_| ())
    }

    /// Render the monitoring stack configuration.
    pub async fn get_monitoring_config(&mut self, grafana_password: &str) -> SdkResult<Value> {
        let mut cmd = self.command(&["plugin", "config", "monitoring"]);
        cmd.env("GRAFANA_PASSWORD", grafana_password);
        self.run_expecting_json("get-monitoring-config", cmd).await
    }

    /// Install the monitoring stack; returns the dashboard URL.
    pub async fn install_monitoring(&mut self, config: &Value) -> SdkResult<String> {
        let mut cmd = self.command(&["plugin", "install", "monitoring"]);
        cmd.arg("--config").arg(config.to_string());
        self.run_expecting_line("install-monitoring", cmd).await
    }

    /// Remove the monitoring stack.
    pub async fn uninstall_monitoring(&mut self) -> SdkResult<()> {
        let cmd = self.command(&["plugin", "uninstall", "monitoring"]);
        self.run("uninstall-monitoring", cmd).await.map(|_| ())
    }

    /// Apply new network settings to the running stack.
    pub async fn update_network(&mut self, params: &UpdateNetworkParams) -> SdkResult<()> {
        let mut cmd = self.command(&["update", "network"]);
        cmd.arg("--l1-rpc-url").arg(&params.l1_rpc_url);
        cmd.arg("--l1-beacon-url").arg(&params.l1_beacon_url);
        self.run("update-network", cmd).await.map(|_| ())
    }

    /// Submit the candidate registration transaction.
    pub async fn verify_register_candidates(&mut self, params: &CandidateParams) -> SdkResult<()> {
        let mut cmd = self.command(&["candidate", "register"]);
        cmd.arg("--amount").arg(params.amount.to_string());
        cmd.arg("--memo").arg(&params.memo);
        cmd.arg("--name").arg(&params.name_info);
        self.run("register-candidate", cmd).await.map(|_| ())
    }

    /// Fetch the registration details written on-chain.
    pub async fn get_registration_additional_info(
        &mut self,
        params: &CandidateParams,
    ) -> SdkResult<Value> {
        let mut cmd = self.command(&["candidate", "info", "--json"]);
        cmd.arg("--name").arg(&params.name_info);
        self.run_expecting_json("candidate-info", cmd).await
    }
}

impl std::fmt::Debug for SdkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkClient")
            .field("network", &self.options.network)
            .field("log_path", &self.options.log_path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(dir: &std::path::Path) -> ClientOptions {
        ClientOptions {
            cancel: CancellationToken::new(),
            log_path: dir.join("logs").join("test_logs.txt"),
            network: Network::Testnet,
            deployment_path: dir.join("deployment"),
            register_candidate: false,
            aws: AwsCredentials {
                access_key: "AKIAEXAMPLE".to_owned(),
                secret_key: "secret".to_owned(),
                region: "ap-northeast-2".to_owned(),
            },
            program: Some("true".to_owned()),
        }
    }

    #[tokio::test]
    async fn connect_creates_log_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let opts = options(dir.path());
        let log_path = opts.log_path.clone();

        let _client = SdkClient::connect(opts).await.expect("connect");
        assert!(log_path.exists());
    }

    #[tokio::test]
    async fn connect_rejects_empty_region() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut opts = options(dir.path());
        opts.aws.region = String::new();

        let err = SdkClient::connect(opts).await.unwrap_err();
        assert!(matches!(err, SdkError::BadConfig(_)));
    }

    #[tokio::test]
    async fn empty_url_output_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        // `true` exits 0 without output: install must report EmptyOutput.
        let mut client = SdkClient::connect(options(dir.path())).await.expect("connect");
        let err = client.install_bridge().await.unwrap_err();
        assert!(matches!(err, SdkError::EmptyOutput { .. }));
    }
}
