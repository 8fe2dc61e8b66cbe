//! Stateless validation probes.
//!
//! Used at the API boundary before anything is persisted: they check that
//! the L1 endpoints answer and that the AWS credentials can see the
//! requested region. None of them require a client or a log file.

use tokio::process::Command;

use crate::error::{SdkError, SdkResult};
use crate::process::run_quiet;
use crate::types::AwsCredentials;

/// Fetch the chain id the L1 RPC endpoint reports.
pub async fn chain_id(l1_rpc_url: &str) -> SdkResult<u64> {
    let mut cmd = Command::new(crate::client::DEFAULT_PROGRAM);
    cmd.args(["probe", "chain-id", "--l1-rpc-url", l1_rpc_url]);
    let out = run_quiet("probe-chain-id", cmd).await?;
    out.parse()
        .map_err(|_| SdkError::Parse(format!("chain id is not a number: {out}")))
}

/// Whether the URL answers as an L1 execution RPC endpoint.
pub async fn is_valid_l1_rpc(url: &str) -> bool {
    let mut cmd = Command::new(crate::client::DEFAULT_PROGRAM);
    cmd.args(["probe", "l1-rpc", "--url", url]);
    run_quiet("probe-l1-rpc", cmd).await.is_ok()
}

/// Whether the URL answers as a beacon-chain endpoint.
pub async fn is_valid_beacon_url(url: &str) -> bool {
    let mut cmd = Command::new(crate::client::DEFAULT_PROGRAM);
    cmd.args(["probe", "beacon", "--url", url]);
    run_quiet("probe-beacon", cmd).await.is_ok()
}

/// Whether the credentials can access the requested region.
pub async fn is_available_region(aws: &AwsCredentials) -> bool {
    let mut cmd = Command::new(crate::client::DEFAULT_PROGRAM);
    cmd.args(["probe", "aws-region"]);
    cmd.env("AWS_ACCESS_KEY_ID", &aws.access_key);
    cmd.env("AWS_SECRET_ACCESS_KEY", &aws.secret_key);
    cmd.env("AWS_REGION", &aws.region);
    run_quiet("probe-aws-region", cmd).await.is_ok()
}
