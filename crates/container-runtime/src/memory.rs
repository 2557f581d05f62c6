//! In-memory container runtime for tests

use crate::{
    ContainerDetails, ContainerRuntime, ContainerState, ContainerSummary, CreateContainerRequest,
    Error, HealthState, LabelFilter, Result,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use uuid::Uuid;

/// Kind of runtime call, used for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `list_containers`
    List,
    /// `inspect_container`
    Inspect,
    /// `create_container`
    Create,
    /// `start_container`
    Start,
    /// `stop_container`
    Stop,
    /// `rename_container`
    Rename,
    /// `remove_container`
    Remove,
    /// `connect_network`
    ConnectNetwork,
}

/// A recorded runtime call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    /// Containers were listed
    List,
    /// A container was inspected
    Inspect(String),
    /// A container was created under this name
    Create(String),
    /// A container was started
    Start(String),
    /// A container was stopped
    Stop(String),
    /// A container was renamed
    Rename {
        /// Container id
        id: String,
        /// New name
        name: String,
    },
    /// A container was removed
    Remove(String),
    /// A container was connected to a network
    ConnectNetwork {
        /// Network name
        network: String,
        /// Container id
        id: String,
        /// Aliases on that network
        aliases: Vec<String>,
    },
}

impl RuntimeCall {
    /// Whether the call changes runtime state
    pub fn is_mutation(&self) -> bool {
        !matches!(self, RuntimeCall::List | RuntimeCall::Inspect(_))
    }
}

/// A container held by [`InMemoryRuntime`]
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryContainer {
    /// Container id
    pub id: String,
    /// Container name
    pub name: String,
    /// Labels
    pub labels: HashMap<String, String>,
    /// State
    pub state: ContainerState,
    /// Health, `None` when no health check is configured
    pub health: Option<HealthState>,
    /// Networks joined, with aliases
    pub networks: Vec<(String, Vec<String>)>,
    /// The request it was created from (default for seeded containers)
    pub request: CreateContainerRequest,
}

impl MemoryContainer {
    /// A container to seed into the runtime, with a generated id
    pub fn new(name: impl Into<String>, state: ContainerState) -> Self {
        Self {
            id: generate_id(),
            name: name.into(),
            labels: HashMap::new(),
            state,
            health: None,
            networks: Vec::new(),
            request: CreateContainerRequest::default(),
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Set the health state
    pub fn with_health(mut self, health: HealthState) -> Self {
        self.health = Some(health);
        self
    }

    fn summary(&self) -> ContainerSummary {
        ContainerSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            labels: self.labels.clone(),
            state: self.state.clone(),
        }
    }

    fn details(&self) -> ContainerDetails {
        ContainerDetails {
            id: self.id.clone(),
            name: self.name.clone(),
            labels: self.labels.clone(),
            state: self.state.clone(),
            health: self.health,
        }
    }
}

struct State {
    containers: Vec<MemoryContainer>,
    calls: Vec<RuntimeCall>,
    failures: HashMap<Operation, String>,
    health_on_create: HealthState,
}

/// In-process runtime with the same observable semantics as a container engine.
///
/// Containers are listed in creation order. Names must be unique, which is
/// what forces a recreate to rename the old container first.
pub struct InMemoryRuntime {
    state: RwLock<State>,
}

impl InMemoryRuntime {
    /// Create an empty runtime
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                containers: Vec::new(),
                calls: Vec::new(),
                failures: HashMap::new(),
                health_on_create: HealthState::Healthy,
            }),
        }
    }

    /// Health reported by new containers that declare a health check
    pub fn set_health_on_create(&self, health: HealthState) {
        self.state.write().unwrap().health_on_create = health;
    }

    /// Insert a pre-existing container, returning its id
    pub fn seed(&self, container: MemoryContainer) -> String {
        let id = container.id.clone();
        self.state.write().unwrap().containers.push(container);
        id
    }

    /// Snapshot of all containers in creation order
    pub fn containers(&self) -> Vec<MemoryContainer> {
        self.state.read().unwrap().containers.clone()
    }

    /// Look up a container by id
    pub fn container(&self, id: &str) -> Option<MemoryContainer> {
        self.state
            .read()
            .unwrap()
            .containers
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    /// Every call made so far
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state.read().unwrap().calls.clone()
    }

    /// Calls that changed runtime state
    pub fn mutations(&self) -> Vec<RuntimeCall> {
        self.calls()
            .into_iter()
            .filter(RuntimeCall::is_mutation)
            .collect()
    }

    /// Forget the recorded calls
    pub fn clear_calls(&self) {
        self.state.write().unwrap().calls.clear();
    }

    /// Make the next call of `operation` fail with `reason`
    pub fn fail_next(&self, operation: Operation, reason: impl Into<String>) {
        self.state
            .write()
            .unwrap()
            .failures
            .insert(operation, reason.into());
    }

    /// Set the health of one container
    pub fn set_health(&self, id: &str, health: Option<HealthState>) {
        let mut state = self.state.write().unwrap();
        if let Some(container) = state.containers.iter_mut().find(|c| c.id == id) {
            container.health = health;
        }
    }

    /// Set the health of every container whose labels match `filter`
    pub fn set_health_matching(&self, filter: &LabelFilter, health: Option<HealthState>) {
        let mut state = self.state.write().unwrap();
        for container in state
            .containers
            .iter_mut()
            .filter(|c| filter.matches(&c.labels))
        {
            container.health = health;
        }
    }

    /// Record a call and consume a pending failure for its operation
    fn record(&self, operation: Operation, call: RuntimeCall) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.calls.push(call);
        match state.failures.remove(&operation) {
            Some(reason) => Err(Error::Rejected {
                operation: operation_name(operation),
                reason,
            }),
            None => Ok(()),
        }
    }

    fn with_container<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut MemoryContainer) -> T,
    ) -> Result<T> {
        let mut state = self.state.write().unwrap();
        state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .map(f)
            .ok_or_else(|| Error::ContainerNotFound(id.to_string()))
    }
}

impl Default for InMemoryRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for InMemoryRuntime {
    async fn list_containers(&self, filter: &LabelFilter) -> Result<Vec<ContainerSummary>> {
        self.record(Operation::List, RuntimeCall::List)?;
        let state = self.state.read().unwrap();
        Ok(state
            .containers
            .iter()
            .filter(|c| filter.matches(&c.labels))
            .map(MemoryContainer::summary)
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails> {
        self.record(Operation::Inspect, RuntimeCall::Inspect(id.to_string()))?;
        self.with_container(id, |c| c.details())
    }

    async fn create_container(&self, request: CreateContainerRequest) -> Result<String> {
        self.record(Operation::Create, RuntimeCall::Create(request.name.clone()))?;
        let mut state = self.state.write().unwrap();
        if state.containers.iter().any(|c| c.name == request.name) {
            return Err(Error::Rejected {
                operation: "create",
                reason: format!("container name \"{}\" is already in use", request.name),
            });
        }

        let health = request
            .healthcheck
            .as_ref()
            .filter(|check| check.test.first().map(String::as_str) != Some("NONE"))
            .map(|_| state.health_on_create);
        let container = MemoryContainer {
            id: generate_id(),
            name: request.name.clone(),
            labels: request
                .labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            state: ContainerState::Created,
            health,
            networks: Vec::new(),
            request,
        };
        let id = container.id.clone();
        state.containers.push(container);
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.record(Operation::Start, RuntimeCall::Start(id.to_string()))?;
        self.with_container(id, |c| c.state = ContainerState::Running)
    }

    async fn stop_container(&self, id: &str, _timeout: Option<Duration>) -> Result<()> {
        self.record(Operation::Stop, RuntimeCall::Stop(id.to_string()))?;
        self.with_container(id, |c| {
            if c.state.is_running() {
                c.state = ContainerState::Exited;
            }
        })
    }

    async fn rename_container(&self, id: &str, new_name: &str) -> Result<()> {
        self.record(
            Operation::Rename,
            RuntimeCall::Rename {
                id: id.to_string(),
                name: new_name.to_string(),
            },
        )?;
        let mut state = self.state.write().unwrap();
        if state
            .containers
            .iter()
            .any(|c| c.name == new_name && c.id != id)
        {
            return Err(Error::Rejected {
                operation: "rename",
                reason: format!("container name \"{}\" is already in use", new_name),
            });
        }
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::ContainerNotFound(id.to_string()))?;
        container.name = new_name.to_string();
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        self.record(Operation::Remove, RuntimeCall::Remove(id.to_string()))?;
        let mut state = self.state.write().unwrap();
        let index = state
            .containers
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::ContainerNotFound(id.to_string()))?;
        if state.containers[index].state.is_running() {
            return Err(Error::Rejected {
                operation: "remove",
                reason: format!("container {} is running", id),
            });
        }
        state.containers.remove(index);
        Ok(())
    }

    async fn connect_network(&self, network: &str, id: &str, aliases: &[String]) -> Result<()> {
        self.record(
            Operation::ConnectNetwork,
            RuntimeCall::ConnectNetwork {
                network: network.to_string(),
                id: id.to_string(),
                aliases: aliases.to_vec(),
            },
        )?;
        self.with_container(id, |c| {
            c.networks.push((network.to_string(), aliases.to_vec()));
        })
    }
}

fn generate_id() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn operation_name(operation: Operation) -> &'static str {
    match operation {
        Operation::List => "list",
        Operation::Inspect => "inspect",
        Operation::Create => "create",
        Operation::Start => "start",
        Operation::Stop => "stop",
        Operation::Rename => "rename",
        Operation::Remove => "remove",
        Operation::ConnectNetwork => "network connect",
    }
}
