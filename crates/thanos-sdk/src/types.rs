//! Typed inputs and outputs of the deployment tooling.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SdkError;

/// L1 block time in seconds. The rollup's submission frequencies are
/// expressed as multiples of this.
pub const L1_BLOCK_TIME_SECS: u64 = 12;

/// Target network for a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    /// Ethereum mainnet.
    Mainnet,
    /// A public testnet.
    Testnet,
    /// Local development network. Recognised but not deployable.
    LocalDevnet,
}

impl Network {
    /// Get the network name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "Mainnet",
            Self::Testnet => "Testnet",
            Self::LocalDevnet => "LocalDevnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Network {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Mainnet" => Ok(Self::Mainnet),
            "Testnet" => Ok(Self::Testnet),
            "LocalDevnet" => Ok(Self::LocalDevnet),
            other => Err(SdkError::BadConfig(format!("unknown network: {other}"))),
        }
    }
}

/// AWS credentials used for infrastructure provisioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsCredentials {
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Region, e.g. `ap-northeast-2`.
    pub region: String,
}

/// Rollup timing configuration, all values in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChainConfiguration {
    /// L2 block time.
    pub l2_block_time: u64,
    /// How often batches are submitted to L1.
    pub batch_submission_frequency: u64,
    /// How often output roots are proposed.
    pub output_root_frequency: u64,
    /// Fault-proof challenge window.
    pub challenge_period: u64,
}

impl ChainConfiguration {
    /// Validate the configuration against the L1 chain the stack targets.
    ///
    /// Submission frequencies must align with L1 block production, and
    /// mainnet requires a challenge period of at least one L1 block.
    pub fn validate(&self, l1_chain_id: u64) -> Result<(), SdkError> {
        let fields = [
            ("l2BlockTime", self.l2_block_time),
            ("batchSubmissionFrequency", self.batch_submission_frequency),
            ("outputRootFrequency", self.output_root_frequency),
            ("challengePeriod", self.challenge_period),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(SdkError::BadConfig(format!("{name} must be positive")));
            }
        }

        if self.batch_submission_frequency % L1_BLOCK_TIME_SECS != 0 {
            return Err(SdkError::BadConfig(format!(
                "batchSubmissionFrequency must be a multiple of the L1 block time ({L1_BLOCK_TIME_SECS}s)"
            )));
        }
        if self.output_root_frequency % L1_BLOCK_TIME_SECS != 0 {
            return Err(SdkError::BadConfig(format!(
                "outputRootFrequency must be a multiple of the L1 block time ({L1_BLOCK_TIME_SECS}s)"
            )));
        }

        // Ethereum mainnet
        if l1_chain_id == 1 && self.challenge_period < L1_BLOCK_TIME_SECS {
            return Err(SdkError::BadConfig(format!(
                "challengePeriod must be at least {L1_BLOCK_TIME_SECS}s on mainnet"
            )));
        }

        Ok(())
    }
}

/// Parameters for deploying the L1 contract suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployContractsParams {
    /// L1 execution RPC endpoint.
    pub l1_rpc_url: String,
    /// Rollup timing configuration.
    pub chain_configuration: ChainConfiguration,
    /// Admin operator private key (no `0x` prefix).
    pub admin_key: String,
    /// Sequencer operator private key.
    pub sequencer_key: String,
    /// Batcher operator private key.
    pub batcher_key: String,
    /// Proposer operator private key.
    pub proposer_key: String,
}

/// Parameters for provisioning the AWS infrastructure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployInfraParams {
    /// Human-readable chain name.
    pub chain_name: String,
    /// L1 beacon endpoint.
    pub l1_beacon_url: String,
}

/// Parameters for an in-place network settings update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNetworkParams {
    /// New L1 execution RPC endpoint.
    pub l1_rpc_url: String,
    /// New L1 beacon endpoint.
    pub l1_beacon_url: String,
}

/// Parameters for DAO candidate registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateParams {
    /// Staking amount in TON.
    pub amount: f64,
    /// Registration memo.
    pub memo: String,
    /// Candidate display name.
    pub name_info: String,
}

/// Public endpoints of a deployed stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInformation {
    /// L2 execution RPC endpoint.
    pub l2_rpc_url: String,
    /// Bridge front-end URL.
    pub bridge_url: String,
    /// Block explorer URL.
    pub block_explorer_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_round_trip() {
        for name in ["Mainnet", "Testnet", "LocalDevnet"] {
            let network: Network = name.parse().expect("parse");
            assert_eq!(network.as_str(), name);
            assert_eq!(network.to_string(), name);
        }
    }

    #[test]
    fn network_rejects_unknown() {
        let err = "Devnet".parse::<Network>().unwrap_err();
        assert!(matches!(err, SdkError::BadConfig(_)));
    }

    #[test]
    fn network_serde_uses_canonical_strings() {
        let json = serde_json::to_string(&Network::Testnet).expect("serialize");
        assert_eq!(json, "\"Testnet\"");
        let back: Network = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, Network::Testnet);
    }

    fn config() -> ChainConfiguration {
        ChainConfiguration {
            l2_block_time: 2,
            batch_submission_frequency: 1440,
            output_root_frequency: 240,
            challenge_period: 12,
        }
    }

    #[test]
    fn chain_configuration_accepts_aligned_values() {
        assert!(config().validate(11_155_111).is_ok());
        assert!(config().validate(1).is_ok());
    }

    #[test]
    fn chain_configuration_rejects_zero() {
        let mut cfg = config();
        cfg.l2_block_time = 0;
        assert!(cfg.validate(1).is_err());
    }

    #[test]
    fn chain_configuration_rejects_misaligned_frequency() {
        let mut cfg = config();
        cfg.batch_submission_frequency = 100;
        assert!(cfg.validate(11_155_111).is_err());
    }

    #[test]
    fn chain_configuration_mainnet_challenge_period() {
        let mut cfg = config();
        cfg.challenge_period = 5;
        assert!(cfg.validate(1).is_err());
        // Permitted outside mainnet.
        assert!(cfg.validate(11_155_111).is_ok());
    }
}
