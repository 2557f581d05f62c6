//! Error types for container runtime calls

use thiserror::Error;

/// Error returned by a [`ContainerRuntime`](crate::ContainerRuntime) call
#[derive(Error, Debug)]
pub enum Error {
    /// The runtime client process could not be spawned
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// The command line that failed to launch
        command: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The runtime client exited with a failure status
    #[error("`{command}` failed with exit code {code:?}: {stderr}")]
    CommandFailed {
        /// The command line that failed
        command: String,
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Trimmed standard error output
        stderr: String,
    },

    /// The runtime returned output we could not decode
    #[error("failed to parse runtime output: {0}")]
    Parse(#[from] serde_json::Error),

    /// No container with this id or name exists
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// The runtime refused the request
    #[error("{operation} rejected: {reason}")]
    Rejected {
        /// Operation that was refused
        operation: &'static str,
        /// Reason given by the runtime
        reason: String,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
