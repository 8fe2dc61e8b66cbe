//! Filesystem layout for deployment artifacts and SDK logs.
//!
//! All paths are relative to the process working directory:
//!
//! - artifacts: `storage/deployments/<name>/<network>/<stackId>/`
//! - logs:      `storage/logs/<stackId>/<action>/<timestamp>_logs.txt`

use std::path::PathBuf;

use chrono::Utc;

use crate::types::{Network, StackId};

/// Root directory for everything the service writes.
const STORAGE_ROOT: &str = "storage";

/// Timestamp format used in log file names.
const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Directory the SDK deploys a stack's artifacts into. Immutable for the
/// lifetime of the stack.
#[must_use]
pub fn deployment_path(name: &str, network: Network, stack_id: &StackId) -> PathBuf {
    [
        STORAGE_ROOT,
        "deployments",
        name,
        network.as_str(),
        stack_id.as_str(),
    ]
    .iter()
    .collect()
}

/// Log file for one action against a stack. A fresh timestamped file per
/// invocation, so retries never clobber earlier output.
#[must_use]
pub fn log_path(stack_id: &StackId, action: &str) -> PathBuf {
    let file = format!("{}_logs.txt", Utc::now().format(LOG_TIMESTAMP_FORMAT));
    [STORAGE_ROOT, "logs", stack_id.as_str(), action, file.as_str()]
        .iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_path_layout() {
        let id = StackId::new("6e1b9f7a-0000-0000-0000-000000000000");
        let path = deployment_path("Thanos", Network::Testnet, &id);
        assert_eq!(
            path.to_string_lossy(),
            format!("storage/deployments/Thanos/Testnet/{id}")
        );
    }

    #[test]
    fn log_path_layout() {
        let id = StackId::generate();
        let path = log_path(&id, "deploy-l1-contracts");
        let text = path.to_string_lossy().into_owned();
        assert!(text.starts_with(&format!("storage/logs/{id}/deploy-l1-contracts/")));
        assert!(text.ends_with("_logs.txt"));

        let file = path.file_name().expect("file name").to_string_lossy();
        // <YYYY-MM-DD-HH-MM-SS>_logs.txt
        let stamp = file.trim_end_matches("_logs.txt");
        assert_eq!(stamp.len(), 19);
        assert_eq!(stamp.matches('-').count(), 5);
    }
}
