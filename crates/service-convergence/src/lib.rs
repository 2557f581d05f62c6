//! # Service convergence
//!
//! Brings the live containers of a service into agreement with its declared
//! configuration.
//!
//! One reconciliation pass for a service waits for its health dependencies,
//! lists the containers labelled with the project and service, scales up or
//! down to the desired replica count, replaces containers whose configuration
//! fingerprint has drifted and restarts the ones that stopped. Independent
//! work runs concurrently inside a [`TaskGroup`]; the first failure cancels
//! the rest and is returned as-is.
//!
//! ## Example
//!
//! ```rust,no_run
//! use container_runtime::DockerCli;
//! use service_convergence::{CancellationToken, Convergence, ConvergenceConfig, ProjectSpec};
//! use std::sync::Arc;
//!
//! # async fn example(project: ProjectSpec) -> service_convergence::Result<()> {
//! let convergence = Convergence::new(Arc::new(DockerCli::new()), ConvergenceConfig::default());
//! convergence
//!     .converge_project(&project, &CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod config;
mod convergence;
mod fingerprint;
mod health;
pub mod labels;
mod lifecycle;
mod numbering;
mod progress;
mod propagation;
mod task_group;

pub use config::{
    ConvergenceConfig, DependencyCondition, DependencyConfig, DeployConfig, LifecycleStrategy,
    ProjectSpec, ServiceSpec,
};
pub use convergence::Convergence;
pub use fingerprint::{config_hash, desired_scale};
pub use health::{HealthGate, MIN_POLL_INTERVAL};
pub use numbering::{allocate_container_numbers, container_number, next_container_number};
pub use progress::{EventStatus, ProgressEvent, ProgressSink};
pub use propagation::LifecycleAnnotations;
pub use task_group::{run_until_cancelled, TaskGroup};
pub use tokio_util::sync::CancellationToken;

/// Error types for convergence operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A container runtime call failed
    #[error(transparent)]
    Runtime(#[from] container_runtime::Error),

    /// A container carries an instance number label that is not a non-negative integer
    #[error("container {container} has invalid container number label {value:?}")]
    InvalidContainerNumber {
        /// Container name
        container: String,
        /// Raw label value
        value: String,
    },

    /// A dependency is gated on health but one of its containers has no health check
    #[error("container for service {service:?} has no healthcheck configured")]
    NoHealthCheck {
        /// Dependency service name
        service: String,
    },

    /// The service configuration could not be serialized for fingerprinting
    #[error("failed to compute configuration hash: {0}")]
    Fingerprint(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation was cancelled by the caller or a failing sibling
    #[error("operation cancelled")]
    Cancelled,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
