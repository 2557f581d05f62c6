//! Docker runtime backed by the `docker` command line client.

use crate::{
    ContainerDetails, ContainerRuntime, ContainerState, ContainerSummary, CreateContainerRequest,
    Error, HealthCheckConfig, HealthState, LabelFilter, Result,
};
use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Runtime that shells out to a local `docker` binary
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    /// Create a runtime using `docker` from `PATH`
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    /// Create a runtime using a specific client binary
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// The client binary this runtime invokes
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Run the client and return stdout on success
    async fn run(&self, args: Vec<String>) -> Result<String> {
        let command = format!("{} {}", self.binary, args.join(" "));
        debug!("Running: {}", command);

        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .await
            .map_err(|source| Error::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("No such container") || stderr.contains("No such object") {
                let target = args.last().cloned().unwrap_or_default();
                return Err(Error::ContainerNotFound(target));
            }
            return Err(Error::CommandFailed {
                command,
                code: output.status.code(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn inspect_many(&self, ids: &[String]) -> Result<Vec<ContainerDetails>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut args = vec!["inspect".to_string(), "--type".to_string(), "container".to_string()];
        args.extend(ids.iter().cloned());
        let output = self.run(args).await?;
        parse_inspect(&output)
    }

    /// Inspect ids one by one, skipping the ones removed in the meantime
    async fn inspect_each(&self, ids: &[String]) -> Result<Vec<ContainerDetails>> {
        let mut details = Vec::with_capacity(ids.len());
        for id in ids {
            match self.inspect_many(std::slice::from_ref(id)).await {
                Ok(found) => details.extend(found),
                Err(Error::ContainerNotFound(_)) => debug!("Container {} is gone", id),
                Err(err) => return Err(err),
            }
        }
        Ok(details)
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn list_containers(&self, filter: &LabelFilter) -> Result<Vec<ContainerSummary>> {
        let mut args = vec![
            "ps".to_string(),
            "-a".to_string(),
            "-q".to_string(),
            "--no-trunc".to_string(),
        ];
        for (key, value) in filter.iter() {
            args.push("--filter".to_string());
            args.push(format!("label={}={}", key, value));
        }

        let output = self.run(args).await?;
        let ids: Vec<String> = output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        // `docker inspect` preserves argument order, so the listing order survives
        let details = match self.inspect_many(&ids).await {
            Err(Error::ContainerNotFound(_)) => {
                debug!("A container vanished while listing, inspecting one at a time");
                self.inspect_each(&ids).await?
            }
            result => result?,
        };
        Ok(details.into_iter().map(ContainerSummary::from).collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails> {
        self.inspect_many(&[id.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::ContainerNotFound(id.to_string()))
    }

    async fn create_container(&self, request: CreateContainerRequest) -> Result<String> {
        let output = self.run(create_args(&request)).await?;
        let id = output.trim().to_string();
        debug!("Created container '{}' with id {}", request.name, id);
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.run(vec!["start".to_string(), id.to_string()]).await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str, timeout: Option<Duration>) -> Result<()> {
        let mut args = vec!["stop".to_string()];
        if let Some(timeout) = timeout {
            args.push("--time".to_string());
            args.push(timeout.as_secs().to_string());
        }
        args.push(id.to_string());
        self.run(args).await?;
        Ok(())
    }

    async fn rename_container(&self, id: &str, new_name: &str) -> Result<()> {
        self.run(vec![
            "rename".to_string(),
            id.to_string(),
            new_name.to_string(),
        ])
        .await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        self.run(vec!["rm".to_string(), id.to_string()]).await?;
        Ok(())
    }

    async fn connect_network(&self, network: &str, id: &str, aliases: &[String]) -> Result<()> {
        let mut args = vec!["network".to_string(), "connect".to_string()];
        for alias in aliases {
            args.push("--alias".to_string());
            args.push(alias.clone());
        }
        args.push(network.to_string());
        args.push(id.to_string());
        self.run(args).await?;
        Ok(())
    }
}

/// Build the `docker create` argument list for a request
pub(crate) fn create_args(request: &CreateContainerRequest) -> Vec<String> {
    let mut args = vec![
        "create".to_string(),
        "--name".to_string(),
        request.name.clone(),
    ];

    for (key, value) in &request.labels {
        args.push("--label".to_string());
        args.push(format!("{}={}", key, value));
    }

    for (key, value) in &request.environment {
        args.push("--env".to_string());
        args.push(format!("{}={}", key, value));
    }

    for volume in &request.volumes {
        args.push("--volume".to_string());
        args.push(volume.clone());
    }

    if let Some(resources) = &request.resources {
        if let Some(cpus) = resources.cpus {
            args.push("--cpus".to_string());
            args.push(cpus.to_string());
        }
        if let Some(memory) = &resources.memory {
            args.push("--memory".to_string());
            args.push(memory.clone());
        }
    }

    if let Some(healthcheck) = &request.healthcheck {
        push_healthcheck_args(&mut args, healthcheck);
    }

    args.push(request.image.clone());
    args.extend(request.command.iter().cloned());
    args
}

fn push_healthcheck_args(args: &mut Vec<String>, healthcheck: &HealthCheckConfig) {
    let test = match healthcheck.test.split_first() {
        Some((kind, rest)) if kind == "NONE" && rest.is_empty() => {
            args.push("--no-healthcheck".to_string());
            return;
        }
        Some((kind, rest)) if kind == "CMD-SHELL" => rest.join(" "),
        // The client only takes a shell command, so exec-form arguments are quoted
        Some((kind, rest)) if kind == "CMD" => rest
            .iter()
            .map(|arg| shell_quote(arg))
            .collect::<Vec<_>>()
            .join(" "),
        _ => healthcheck.test.join(" "),
    };
    if test.is_empty() {
        return;
    }

    args.push("--health-cmd".to_string());
    args.push(test);
    if let Some(interval) = healthcheck.interval {
        args.push("--health-interval".to_string());
        args.push(format!("{}s", interval));
    }
    if let Some(timeout) = healthcheck.timeout {
        args.push("--health-timeout".to_string());
        args.push(format!("{}s", timeout));
    }
    if let Some(retries) = healthcheck.retries {
        args.push("--health-retries".to_string());
        args.push(retries.to_string());
    }
}

/// Quote one argument for `/bin/sh` unless it is plainly safe
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectRecord {
    id: String,
    name: String,
    state: InspectState,
    config: InspectConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
    #[serde(default)]
    health: Option<InspectHealth>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHealth {
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

/// Decode `docker inspect` output
pub(crate) fn parse_inspect(output: &str) -> Result<Vec<ContainerDetails>> {
    let records: Vec<InspectRecord> = serde_json::from_str(output)?;
    Ok(records
        .into_iter()
        .map(|record| ContainerDetails {
            id: record.id,
            name: record.name.trim_start_matches('/').to_string(),
            labels: record.config.labels.unwrap_or_default(),
            state: ContainerState::parse(&record.state.status),
            health: record
                .state
                .health
                .and_then(|health| HealthState::parse(&health.status)),
        })
        .collect())
}
