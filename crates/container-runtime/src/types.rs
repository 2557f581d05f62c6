//! Value types exchanged with the container runtime.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Lifecycle state of a container as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    /// Created but never started
    Created,
    /// Running
    Running,
    /// Paused
    Paused,
    /// Restarting
    Restarting,
    /// Stopped
    Exited,
    /// Failed to stop or be removed
    Dead,
    /// A state this crate does not know about
    Other(String),
}

impl ContainerState {
    /// Parse the runtime's state string (`running`, `exited`, ...)
    pub fn parse(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "created" => ContainerState::Created,
            "running" => ContainerState::Running,
            "paused" => ContainerState::Paused,
            "restarting" => ContainerState::Restarting,
            "exited" => ContainerState::Exited,
            "dead" => ContainerState::Dead,
            other => ContainerState::Other(other.to_string()),
        }
    }

    /// Whether the container is currently running
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            ContainerState::Created => "created",
            ContainerState::Running => "running",
            ContainerState::Paused => "paused",
            ContainerState::Restarting => "restarting",
            ContainerState::Exited => "exited",
            ContainerState::Dead => "dead",
            ContainerState::Other(other) => other,
        };
        f.write_str(state)
    }
}

/// Health sub-status of a container that has a health check configured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Health check has not passed yet
    Starting,
    /// Last health checks passed
    Healthy,
    /// Health check failed beyond its retry budget
    Unhealthy,
}

impl HealthState {
    /// Parse the runtime's health string; `none` and unknown values yield `None`
    pub fn parse(status: &str) -> Option<Self> {
        match status.trim().to_ascii_lowercase().as_str() {
            "starting" => Some(HealthState::Starting),
            "healthy" => Some(HealthState::Healthy),
            "unhealthy" => Some(HealthState::Unhealthy),
            _ => None,
        }
    }
}

/// Summary of a container as returned by a listing
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSummary {
    /// Full container id
    pub id: String,
    /// Container name without the leading `/`
    pub name: String,
    /// Labels attached at creation time
    pub labels: HashMap<String, String>,
    /// Current state
    pub state: ContainerState,
}

impl ContainerSummary {
    /// Value of a label, if present
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// First 12 characters of the id
    pub fn short_id(&self) -> &str {
        self.id.get(..12).unwrap_or(&self.id)
    }
}

/// Detailed container state as returned by an inspect
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerDetails {
    /// Full container id
    pub id: String,
    /// Container name without the leading `/`
    pub name: String,
    /// Labels attached at creation time
    pub labels: HashMap<String, String>,
    /// Current state
    pub state: ContainerState,
    /// Health sub-status, `None` when no health check is configured
    pub health: Option<HealthState>,
}

impl From<ContainerDetails> for ContainerSummary {
    fn from(details: ContainerDetails) -> Self {
        ContainerSummary {
            id: details.id,
            name: details.name,
            labels: details.labels,
            state: details.state,
        }
    }
}

/// Conjunction of `key=value` label constraints used to list containers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelFilter {
    labels: Vec<(String, String)>,
}

impl LabelFilter {
    /// Create an empty filter matching every container
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required label
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    /// Iterate over the required labels
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether a label set satisfies every constraint
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        self.iter()
            .all(|(key, value)| labels.get(key).map(String::as_str) == Some(value))
    }
}

/// Resource limits passed through to the runtime
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU quota (`--cpus`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<f64>,
    /// Memory limit (`--memory`), e.g. `512m`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Health check executed by the runtime inside the container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Command run inside the container (shell form)
    pub test: Vec<String>,
    /// Seconds between checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    /// Seconds before a single check is considered hung
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Consecutive failures before the container is unhealthy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

/// Everything the runtime needs to create a container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateContainerRequest {
    /// Container name
    pub name: String,
    /// Image reference
    pub image: String,
    /// Command override; empty keeps the image default
    pub command: Vec<String>,
    /// Environment variables
    pub environment: BTreeMap<String, String>,
    /// Volume mounts in `source:target[:mode]` form
    pub volumes: Vec<String>,
    /// Labels to attach
    pub labels: BTreeMap<String, String>,
    /// Resource limits
    pub resources: Option<ResourceLimits>,
    /// Health check
    pub healthcheck: Option<HealthCheckConfig>,
}
