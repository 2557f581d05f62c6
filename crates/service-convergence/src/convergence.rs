//! Service reconciliation.
//!
//! A pass re-reads the runtime every time; nothing about earlier passes is
//! remembered beyond the labels on the containers themselves.

use crate::{
    allocate_container_numbers, config_hash, container_number, desired_scale, labels,
    run_until_cancelled, CancellationToken, ConvergenceConfig, HealthGate, LifecycleAnnotations,
    LifecycleStrategy, ProgressSink, ProjectSpec, Result, ServiceSpec, TaskGroup,
};
use container_runtime::{ContainerRuntime, ContainerSummary, DockerCli};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Converges services onto a container runtime
pub struct Convergence {
    pub(crate) runtime: Arc<dyn ContainerRuntime>,
    pub(crate) config: ConvergenceConfig,
    pub(crate) progress: ProgressSink,
    health: HealthGate,
}

impl Convergence {
    /// Create an engine driving `runtime`
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: ConvergenceConfig) -> Self {
        let health = HealthGate::new(runtime.clone(), config.health_poll_interval());
        Self {
            runtime,
            config,
            progress: ProgressSink::discard(),
            health,
        }
    }

    /// Create an engine driving the Docker CLI named in `config`
    pub fn docker(config: ConvergenceConfig) -> Self {
        let runtime = Arc::new(DockerCli::with_binary(config.docker_binary.clone()));
        Self::new(runtime, config)
    }

    /// Send progress events to `progress`
    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// Engine settings
    pub fn config(&self) -> &ConvergenceConfig {
        &self.config
    }

    /// The dependency health gate
    pub fn health_gate(&self) -> &HealthGate {
        &self.health
    }

    /// Converge every service of the project, dependencies first.
    ///
    /// Lifecycle annotations propagated by one service's recreate apply to
    /// the services reconciled after it in this call, and to nothing else.
    pub async fn converge_project(
        &self,
        project: &ProjectSpec,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut annotations = LifecycleAnnotations::new();
        for service in project.services_in_dependency_order()? {
            self.ensure_service(project, service, &mut annotations, cancel)
                .await?;
        }
        info!("Project '{}' converged", project.name);
        Ok(())
    }

    /// Bring the containers of one service in line with its spec.
    ///
    /// Waits for health-gated dependencies, then creates missing replicas,
    /// removes excess ones, recreates drifted (or force-recreated) containers
    /// and restarts stopped ones, all concurrently. Returns the first error;
    /// work already committed to the runtime is left as-is.
    pub async fn ensure_service(
        &self,
        project: &ProjectSpec,
        service: &ServiceSpec,
        annotations: &mut LifecycleAnnotations,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.health
            .wait_dependencies(project, service, cancel)
            .await?;

        let filter = labels::service_filter(&project.name, &service.name);
        let actual = run_until_cancelled(cancel, self.runtime.list_containers(&filter)).await??;

        let scale = desired_scale(service);
        let expected = config_hash(service)?;
        let force_recreate = annotations.force_recreate(service);
        info!(
            "Converging service '{}': {} container(s), {} desired",
            service.name,
            actual.len(),
            scale
        );

        let missing = if actual.len() < scale {
            allocate_container_numbers(&actual, scale - actual.len())?
        } else {
            Vec::new()
        };
        let (actual, excess) = split_excess(actual, scale)?;

        let recreated = AtomicBool::new(false);
        let mut group = TaskGroup::new(cancel);

        for number in missing {
            let name = labels::container_name(&project.name, &service.name, number);
            group.spawn(self.create_container(project, service, name, number));
        }

        for container in excess {
            group.spawn(async move { self.remove_container(service, &container).await });
        }

        for container in actual {
            let diverged = container.label(labels::CONFIG_HASH) != Some(expected.as_str());
            if diverged || force_recreate {
                let recreated = &recreated;
                group.spawn(async move {
                    self.recreate_container(project, service, &container).await?;
                    recreated.store(true, Ordering::SeqCst);
                    Ok(())
                });
                continue;
            }

            if container.state.is_running() {
                continue;
            }

            group.spawn(async move { self.restart_container(service, &container).await });
        }

        let result = group.wait().await;

        if recreated.load(Ordering::SeqCst) {
            annotations.propagate(project, &service.name, LifecycleStrategy::ForceRecreate);
        }
        result
    }
}

/// Split containers into the ones to keep and the excess beyond `scale`.
///
/// The lowest instance numbers are kept so numbering stays contiguous.
fn split_excess(
    actual: Vec<ContainerSummary>,
    scale: usize,
) -> Result<(Vec<ContainerSummary>, Vec<ContainerSummary>)> {
    if actual.len() <= scale {
        return Ok((actual, Vec::new()));
    }

    let mut numbered = actual
        .into_iter()
        .map(|container| Ok((container_number(&container)?, container)))
        .collect::<Result<Vec<_>>>()?;
    numbered.sort_by_key(|(number, _)| *number);

    let mut keep: Vec<ContainerSummary> = numbered.into_iter().map(|(_, c)| c).collect();
    let excess = keep.split_off(scale);
    Ok((keep, excess))
}
