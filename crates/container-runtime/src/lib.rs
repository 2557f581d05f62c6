//! # Container runtime
//!
//! The container runtime API surface consumed by service convergence.
//!
//! This crate defines what the reconciler needs from a container engine
//! (list, inspect, create, start, stop, rename, remove and network connect)
//! as a single async trait, plus the implementations that back it:
//!
//! - [`DockerCli`] drives a local `docker` binary
//! - [`InMemoryRuntime`] is a faithful in-process fake (feature `test-utils`)
//!
//! ## Example
//!
//! ```rust,no_run
//! use container_runtime::{ContainerRuntime, DockerCli, LabelFilter};
//!
//! # async fn example() -> container_runtime::Result<()> {
//! let docker = DockerCli::new();
//! let filter = LabelFilter::new().with("com.docker.compose.project", "demo");
//! for container in docker.list_containers(&filter).await? {
//!     println!("{} {}", container.short_id(), container.name);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod docker;
mod error;
#[cfg(feature = "test-utils")]
mod memory;
mod types;

pub use docker::DockerCli;
pub use error::{Error, Result};
#[cfg(feature = "test-utils")]
pub use memory::{InMemoryRuntime, MemoryContainer, Operation, RuntimeCall};
pub use types::{
    ContainerDetails, ContainerState, ContainerSummary, CreateContainerRequest, HealthCheckConfig,
    HealthState, LabelFilter, ResourceLimits,
};

use async_trait::async_trait;
use std::time::Duration;

/// Operations the reconciler performs against a container engine.
///
/// Every method is a suspension point; implementations must be safe to call
/// concurrently for disjoint containers.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List all containers (running or not) carrying every label in `filter`.
    ///
    /// The returned order is the runtime's own listing order.
    async fn list_containers(&self, filter: &LabelFilter) -> Result<Vec<ContainerSummary>>;

    /// Inspect a single container, including its health sub-status
    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails>;

    /// Create (but do not start) a container, returning its id
    async fn create_container(&self, request: CreateContainerRequest) -> Result<String>;

    /// Start an existing container
    async fn start_container(&self, id: &str) -> Result<()>;

    /// Gracefully stop a container, using the runtime's default timeout when `None`
    async fn stop_container(&self, id: &str, timeout: Option<Duration>) -> Result<()>;

    /// Rename a container
    async fn rename_container(&self, id: &str, new_name: &str) -> Result<()>;

    /// Remove a stopped container
    async fn remove_container(&self, id: &str) -> Result<()>;

    /// Connect a container to a named network under the given aliases
    async fn connect_network(&self, network: &str, id: &str, aliases: &[String]) -> Result<()>;
}
