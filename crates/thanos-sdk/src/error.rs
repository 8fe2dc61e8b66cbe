//! Error types for the SDK adapter.

use thiserror::Error;

/// Result type alias using [`SdkError`].
pub type SdkResult<T> = Result<T, SdkError>;

/// Errors that can occur while driving the external deployment tooling.
#[derive(Debug, Error)]
pub enum SdkError {
    /// The client was configured with values the tooling cannot work with
    /// (unknown network, empty credentials, bad paths).
    #[error("bad configuration: {0}")]
    BadConfig(String),

    /// The operation observed its cancellation token.
    ///
    /// Recovered locally by callers; never treated as a deployment failure.
    #[error("operation cancelled")]
    Cancelled,

    /// The external tool exited with a non-zero status.
    #[error("{op} failed with exit code {exit_code}: {stderr}")]
    Command {
        /// Operation name, e.g. `deploy-l1-contracts`.
        op: &'static str,
        /// Process exit code (-1 if killed by a signal).
        exit_code: i32,
        /// Trailing stderr output.
        stderr: String,
    },

    /// The external tool succeeded but printed nothing where output was
    /// expected (a URL, a JSON document).
    #[error("{op} produced no output")]
    EmptyOutput {
        /// Operation name.
        op: &'static str,
    },

    /// Filesystem or process I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The tool's output could not be parsed.
    #[error("failed to parse output: {0}")]
    Parse(String),
}

impl SdkError {
    /// Whether this failure came from the cancellation token.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_is_distinguishable() {
        assert!(SdkError::Cancelled.is_cancelled());
        assert!(!SdkError::BadConfig("x".to_owned()).is_cancelled());
        assert!(!SdkError::Command {
            op: "deploy-l1-contracts",
            exit_code: 1,
            stderr: "boom".to_owned(),
        }
        .is_cancelled());
    }

    #[test]
    fn command_error_message() {
        let err = SdkError::Command {
            op: "destroy-aws-infra",
            exit_code: 2,
            stderr: "quota exceeded".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "destroy-aws-infra failed with exit code 2: quota exceeded"
        );
    }
}
