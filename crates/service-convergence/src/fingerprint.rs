//! Configuration fingerprint and replica count resolution.

use crate::{config::DependencyConfig, Result, ServiceSpec};
use container_runtime::{HealthCheckConfig, ResourceLimits};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// The fields of a service that define its containers.
///
/// Replica count and lifecycle strategy are left out: neither changes what
/// an individual container looks like.
#[derive(Serialize)]
struct ContainerDefinition<'a> {
    name: &'a str,
    image: &'a str,
    command: &'a [String],
    environment: &'a BTreeMap<String, String>,
    volumes: &'a [String],
    networks: &'a [String],
    depends_on: &'a BTreeMap<String, DependencyConfig>,
    healthcheck: Option<&'a HealthCheckConfig>,
    resources: Option<&'a ResourceLimits>,
}

impl<'a> From<&'a ServiceSpec> for ContainerDefinition<'a> {
    fn from(spec: &'a ServiceSpec) -> Self {
        Self {
            name: &spec.name,
            image: &spec.image,
            command: &spec.command,
            environment: &spec.environment,
            volumes: &spec.volumes,
            networks: &spec.networks,
            depends_on: &spec.depends_on,
            healthcheck: spec.healthcheck.as_ref(),
            resources: spec.resources.as_ref(),
        }
    }
}

/// Hex-encoded SHA-256 of the service's container definition
pub fn config_hash(spec: &ServiceSpec) -> Result<String> {
    let json = serde_json::to_vec(&ContainerDefinition::from(spec))?;
    let mut hasher = Sha256::new();
    hasher.update(&json);
    Ok(hex::encode(hasher.finalize()))
}

/// Number of replicas the service should run.
///
/// `deploy.replicas` wins when set (including zero), then a non-zero
/// `scale`, then one.
pub fn desired_scale(spec: &ServiceSpec) -> usize {
    if let Some(replicas) = spec.deploy.as_ref().and_then(|d| d.replicas) {
        return replicas as usize;
    }
    if spec.scale != 0 {
        return spec.scale as usize;
    }
    1
}
