//! Dependency health gate.
//!
//! Before a service is reconciled, every dependency declared with the
//! `service_healthy` condition is polled until all of its containers report
//! a passing health status. The gate only reads the status the runtime
//! exposes; it never runs checks itself and imposes no deadline.

use crate::{
    labels, run_until_cancelled, CancellationToken, Error, ProjectSpec, Result, ServiceSpec,
    TaskGroup,
};
use async_io::Timer;
use container_runtime::{ContainerRuntime, HealthState};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Shortest delay the gate will poll with
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Polls dependency health through the container runtime
#[derive(Clone)]
pub struct HealthGate {
    runtime: Arc<dyn ContainerRuntime>,
    interval: Duration,
}

impl HealthGate {
    /// Create a gate polling every `interval`, at least [`MIN_POLL_INTERVAL`]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, interval: Duration) -> Self {
        Self {
            runtime,
            interval: interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// Delay between polls
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until every health-gated dependency of `service` is healthy.
    ///
    /// Dependencies are awaited concurrently; the first failure cancels the
    /// other waits.
    pub async fn wait_dependencies(
        &self,
        project: &ProjectSpec,
        service: &ServiceSpec,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut group = TaskGroup::new(cancel);
        for dependency in service.health_dependencies() {
            let token = group.token().clone();
            group.spawn(async move { self.wait_healthy(&project.name, dependency, &token).await });
        }
        group.wait().await
    }

    /// Poll one dependency until it is healthy, fails, or `cancel` fires
    pub async fn wait_healthy(
        &self,
        project: &str,
        dependency: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut ticker = Timer::interval(self.interval);
        loop {
            if self.is_service_healthy(project, dependency).await? {
                info!("Dependency '{}' is healthy", dependency);
                return Ok(());
            }
            debug!(
                "Dependency '{}' not healthy yet, polling again in {:?}",
                dependency, self.interval
            );
            run_until_cancelled(cancel, ticker.next()).await?;
        }
    }

    /// Whether every container of `service` reports healthy.
    ///
    /// A container without a health check is a configuration error: there is
    /// no signal to wait on.
    pub async fn is_service_healthy(&self, project: &str, service: &str) -> Result<bool> {
        let containers = self
            .runtime
            .list_containers(&labels::service_filter(project, service))
            .await?;

        for container in containers {
            let details = self.runtime.inspect_container(&container.id).await?;
            match details.health {
                None => {
                    return Err(Error::NoHealthCheck {
                        service: service.to_string(),
                    });
                }
                Some(HealthState::Starting) | Some(HealthState::Unhealthy) => return Ok(false),
                Some(HealthState::Healthy) => {}
            }
        }
        Ok(true)
    }
}
