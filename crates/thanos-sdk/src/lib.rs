//! Adapter around the external `trh-sdk` deployment tooling.
//!
//! The heavy lifting — deploying L1 contracts, provisioning and destroying
//! AWS infrastructure, installing add-on services — is performed by the
//! `trh-sdk` command-line tool. This crate wraps it behind a typed client:
//!
//! - [`SdkClient`] is bound to one stack action: it owns an append-only log
//!   file and a cancellation token, and every operation streams the tool's
//!   output into that file.
//! - Cancelling the token kills the child process and surfaces as
//!   [`SdkError::Cancelled`], distinguishable from ordinary failures so that
//!   callers can treat an operator-requested stop differently from a broken
//!   deployment.
//! - Stateless probes ([`probe`]) validate RPC endpoints, beacon endpoints
//!   and AWS credentials without creating a client.

#![forbid(unsafe_code)]

pub mod client;
pub mod error;
pub mod probe;
pub mod process;
pub mod types;

pub use client::{ClientOptions, SdkClient};
pub use error::{SdkError, SdkResult};
pub use types::{
    AwsCredentials, CandidateParams, ChainConfiguration, ChainInformation, DeployContractsParams,
    DeployInfraParams, Network, UpdateNetworkParams,
};
