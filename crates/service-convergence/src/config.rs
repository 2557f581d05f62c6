//! Service and project specifications, and convergence settings.
//!
//! The specification types are produced by whatever parses the deployment
//! document; this crate only reads them. Maps are `BTreeMap`s so that the
//! serialized form, and therefore the configuration fingerprint, is stable.

use crate::{Error, Result};
use container_runtime::{HealthCheckConfig, ResourceLimits};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::time::Duration;

/// Desired configuration of one service
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceSpec {
    /// Service name, unique within the project
    pub name: String,
    /// Image reference
    #[serde(default)]
    pub image: String,
    /// Command override
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Environment variables
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    /// Volume mounts in `source:target[:mode]` form
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    /// Project networks to attach to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,
    /// Services this one depends on, with the condition to wait for
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub depends_on: BTreeMap<String, DependencyConfig>,
    /// Health check run by the container runtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<HealthCheckConfig>,
    /// Resource limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceLimits>,
    /// Replica count, `0` meaning unset
    #[serde(default)]
    pub scale: u32,
    /// Deployment settings; `replicas` overrides `scale`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeployConfig>,
    /// Lifecycle strategy declared in the document
    #[serde(
        rename = "x-lifecycle",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub lifecycle: Option<LifecycleStrategy>,
}

impl ServiceSpec {
    /// Create a service running `image` with every other setting at its default
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    /// Names of the services this one depends on
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.depends_on.keys().map(String::as_str)
    }

    /// Whether `service` is one of this service's dependencies
    pub fn depends_on_service(&self, service: &str) -> bool {
        self.depends_on.contains_key(service)
    }

    /// Dependencies that must report healthy before this service is reconciled
    pub fn health_dependencies(&self) -> impl Iterator<Item = &str> {
        self.depends_on
            .iter()
            .filter(|(_, dep)| dep.condition == DependencyCondition::ServiceHealthy)
            .map(|(name, _)| name.as_str())
    }
}

/// A dependency edge
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencyConfig {
    /// Condition the dependency must meet
    #[serde(default)]
    pub condition: DependencyCondition,
}

impl DependencyConfig {
    /// Dependency gated on health
    pub fn healthy() -> Self {
        Self {
            condition: DependencyCondition::ServiceHealthy,
        }
    }

    /// Dependency that only orders startup
    pub fn started() -> Self {
        Self {
            condition: DependencyCondition::ServiceStarted,
        }
    }
}

/// Condition attached to a dependency
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DependencyCondition {
    /// The dependency has been started
    #[default]
    ServiceStarted,
    /// The dependency's containers report healthy
    ServiceHealthy,
    /// The dependency ran to completion
    ServiceCompletedSuccessfully,
}

/// Deployment settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployConfig {
    /// Replica count overriding `scale` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
}

/// Lifecycle strategy for a service's containers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStrategy {
    /// Recreate every container even when its fingerprint matches
    ForceRecreate,
}

/// A named, ordered set of services
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectSpec {
    /// Project name, used in labels, container and network names
    pub name: String,
    /// Services in declaration order
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
}

impl ProjectSpec {
    /// Create a project
    pub fn new(name: impl Into<String>, services: Vec<ServiceSpec>) -> Self {
        Self {
            name: name.into(),
            services,
        }
    }

    /// Look up a service by name
    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Services that list `name` as a dependency
    pub fn dependents_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ServiceSpec> {
        self.services
            .iter()
            .filter(move |s| s.depends_on_service(name))
    }

    /// Services ordered so every dependency precedes its dependents.
    ///
    /// Services that become ready together keep their declaration order.
    pub fn services_in_dependency_order(&self) -> Result<Vec<&ServiceSpec>> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&ServiceSpec>> = HashMap::new();

        for service in &self.services {
            if in_degree.insert(&service.name, 0).is_some() {
                return Err(Error::Config(format!(
                    "Service '{}' is declared more than once",
                    service.name
                )));
            }
        }

        for service in &self.services {
            for dep in service.dependencies() {
                if !in_degree.contains_key(dep) {
                    return Err(Error::Config(format!(
                        "Service '{}' depends on unknown service '{}'",
                        service.name, dep
                    )));
                }
                dependents.entry(dep).or_default().push(service);
            }
            in_degree.insert(&service.name, service.depends_on.len());
        }

        let mut queue: VecDeque<&ServiceSpec> = self
            .services
            .iter()
            .filter(|s| s.depends_on.is_empty())
            .collect();
        let mut ordered = Vec::with_capacity(self.services.len());

        while let Some(service) = queue.pop_front() {
            ordered.push(service);
            for dependent in dependents.get(service.name.as_str()).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent.name.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }

        if ordered.len() != self.services.len() {
            return Err(Error::Config("Circular dependency detected".to_string()));
        }

        Ok(ordered)
    }
}

/// Settings for the convergence engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConvergenceConfig {
    /// Delay between two health polls of a dependency, in milliseconds
    pub health_poll_interval_ms: u64,
    /// Graceful stop timeout in seconds; runtime default when unset
    pub stop_timeout_secs: Option<u64>,
    /// Container runtime client binary
    pub docker_binary: String,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            health_poll_interval_ms: 500,
            stop_timeout_secs: None,
            docker_binary: "docker".to_string(),
        }
    }
}

impl ConvergenceConfig {
    /// Parse settings from YAML; missing keys take their defaults
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: ConvergenceConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load settings from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Delay between health polls, never less than a millisecond
    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_millis(self.health_poll_interval_ms.max(1))
    }

    /// Graceful stop timeout
    pub fn stop_timeout(&self) -> Option<Duration> {
        self.stop_timeout_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.health_poll_interval_ms == 0 {
            return Err(Error::Config(
                "health_poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.docker_binary.trim().is_empty() {
            return Err(Error::Config("docker_binary must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn service(name: &str, deps: &[&str]) -> ServiceSpec {
        let mut spec = ServiceSpec::new(name, "busybox");
        for dep in deps {
            spec.depends_on
                .insert(dep.to_string(), DependencyConfig::started());
        }
        spec
    }

    fn names(services: Vec<&ServiceSpec>) -> Vec<&str> {
        services.into_iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_service_spec_from_yaml() {
        let yaml = r#"
name: web
image: nginx:alpine
networks: [default]
depends_on:
  db:
    condition: service_healthy
  cache: {}
deploy:
  replicas: 3
x-lifecycle: force_recreate
"#;
        let spec: ServiceSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.name, "web");
        assert_eq!(spec.scale, 0);
        assert_eq!(spec.deploy.as_ref().unwrap().replicas, Some(3));
        assert_eq!(spec.lifecycle, Some(LifecycleStrategy::ForceRecreate));
        assert_eq!(
            spec.depends_on["cache"].condition,
            DependencyCondition::ServiceStarted
        );
        assert_eq!(spec.health_dependencies().collect::<Vec<_>>(), vec!["db"]);
    }

    #[test]
    fn test_dependents_of() {
        let project = ProjectSpec::new(
            "demo",
            vec![
                service("db", &[]),
                service("api", &["db"]),
                service("worker", &["db", "api"]),
                service("docs", &[]),
            ],
        );

        let dependents: Vec<_> = project.dependents_of("db").map(|s| &s.name).collect();
        assert_eq!(dependents, vec!["api", "worker"]);
        assert_eq!(project.dependents_of("docs").count(), 0);
    }

    #[test]
    fn test_dependency_order() {
        let project = ProjectSpec::new(
            "demo",
            vec![
                service("worker", &["api", "db"]),
                service("api", &["db"]),
                service("docs", &[]),
                service("db", &[]),
            ],
        );

        let ordered = project.services_in_dependency_order().unwrap();
        assert_eq!(names(ordered), vec!["docs", "db", "api", "worker"]);
    }

    #[test]
    fn test_dependency_order_rejects_cycles() {
        let project = ProjectSpec::new("demo", vec![service("a", &["b"]), service("b", &["a"])]);
        assert!(matches!(
            project.services_in_dependency_order(),
            Err(Error::Config(msg)) if msg.contains("Circular")
        ));
    }

    #[test]
    fn test_dependency_order_rejects_unknown_service() {
        let project = ProjectSpec::new("demo", vec![service("api", &["db"])]);
        assert!(matches!(
            project.services_in_dependency_order(),
            Err(Error::Config(msg)) if msg.contains("unknown service 'db'")
        ));
    }

    #[test]
    fn test_convergence_config_defaults() {
        let config = ConvergenceConfig::from_yaml_str("stop_timeout_secs: 5").unwrap();
        assert_eq!(config.health_poll_interval(), Duration::from_millis(500));
        assert_eq!(config.stop_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.docker_binary, "docker");
    }

    #[test]
    fn test_convergence_config_rejects_zero_interval() {
        let result = ConvergenceConfig::from_yaml_str("health_poll_interval_ms: 0");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_hand_built_zero_interval_is_clamped() {
        let config = ConvergenceConfig {
            health_poll_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.health_poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_convergence_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "health_poll_interval_ms: 50").unwrap();
        writeln!(file, "docker_binary: podman").unwrap();

        let config = ConvergenceConfig::from_file(file.path()).unwrap();
        assert_eq!(config.health_poll_interval(), Duration::from_millis(50));
        assert_eq!(config.docker_binary, "podman");
        assert_eq!(config.stop_timeout(), None);
    }
}
