//! Labels and names that identify managed containers.
//!
//! Labels are the only state carried between reconciliation passes: a pass
//! rediscovers its containers by project and service label and reads the
//! instance number and configuration hash back off them.

use container_runtime::LabelFilter;
use std::collections::BTreeMap;

/// Project the container belongs to
pub const PROJECT: &str = "com.docker.compose.project";
/// Service the container runs
pub const SERVICE: &str = "com.docker.compose.service";
/// Instance number of the container within its service
pub const CONTAINER_NUMBER: &str = "com.docker.compose.container-number";
/// Fingerprint of the configuration the container was created from
pub const CONFIG_HASH: &str = "com.docker.compose.config-hash";
/// Whether the container is a one-off run rather than a service replica
pub const ONEOFF: &str = "com.docker.compose.oneoff";

/// Filter matching every container of one service
pub fn service_filter(project: &str, service: &str) -> LabelFilter {
    LabelFilter::new()
        .with(PROJECT, project)
        .with(SERVICE, service)
}

/// Labels for a new service container
pub fn container_labels(
    project: &str,
    service: &str,
    number: u32,
    config_hash: &str,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        (PROJECT.to_string(), project.to_string()),
        (SERVICE.to_string(), service.to_string()),
        (CONTAINER_NUMBER.to_string(), number.to_string()),
        (CONFIG_HASH.to_string(), config_hash.to_string()),
        (ONEOFF.to_string(), "False".to_string()),
    ])
}

/// Canonical name of a service container
pub fn container_name(project: &str, service: &str, number: u32) -> String {
    format!("{}_{}_{}", project, service, number)
}

/// Runtime name of a project network
pub fn network_name(project: &str, network: &str) -> String {
    format!("{}_{}", project, network)
}
