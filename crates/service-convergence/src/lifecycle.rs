//! Lifecycle operations on individual containers.
//!
//! Each operation wraps runtime calls with progress events. None of them
//! retry: a failed runtime call is the operation's result.

use crate::{
    config_hash, container_number, labels, Convergence, Error, ProjectSpec, Result, ServiceSpec,
};
use container_runtime::{ContainerSummary, CreateContainerRequest};
use std::future::Future;
use tracing::{debug, info, warn};

impl Convergence {
    /// Create, connect and start a new container for `service`
    pub async fn create_container(
        &self,
        project: &ProjectSpec,
        service: &ServiceSpec,
        name: String,
        number: u32,
    ) -> Result<()> {
        self.report_progress(&service.name, "Create", "Created", async {
            self.run_container(project, service, &name, number).await?;
            info!("Created container {} for service '{}'", name, service.name);
            Ok(())
        })
        .await
    }

    /// Replace `container` with a fresh one built from the current spec.
    ///
    /// The old container is stopped and renamed out of the way before the
    /// replacement is created under the canonical name, and only deleted once
    /// the replacement is running. A failed create leaves the old container
    /// in place under its temporary name; the next pass still names the
    /// replacement `{project}_{service}_{number}`.
    pub async fn recreate_container(
        &self,
        project: &ProjectSpec,
        service: &ServiceSpec,
        container: &ContainerSummary,
    ) -> Result<()> {
        let number = container_number(container)?;
        self.report_progress(&service.name, "Recreate", "Recreated", async {
            self.runtime
                .stop_container(&container.id, self.config.stop_timeout())
                .await?;

            let name = labels::container_name(&project.name, &service.name, number);
            let tmp_name = format!("{}_{}", container.short_id(), name);
            // Already parked by an earlier failed recreate
            if container.name != tmp_name {
                debug!("Renaming {} to {}", container.name, tmp_name);
                self.runtime.rename_container(&container.id, &tmp_name).await?;
            }

            self.run_container(project, service, &name, number).await?;

            self.runtime.remove_container(&container.id).await?;
            info!("Recreated container {} for service '{}'", name, service.name);
            Ok(())
        })
        .await
    }

    /// Start an existing, stopped container as-is
    pub async fn restart_container(
        &self,
        service: &ServiceSpec,
        container: &ContainerSummary,
    ) -> Result<()> {
        self.report_progress(&service.name, "Restart", "Restarted", async {
            self.runtime.start_container(&container.id).await?;
            info!("Restarted container {}", container.name);
            Ok(())
        })
        .await
    }

    /// Stop and delete a container that is no longer wanted
    pub async fn remove_container(
        &self,
        service: &ServiceSpec,
        container: &ContainerSummary,
    ) -> Result<()> {
        self.report_progress(&service.name, "Remove", "Removed", async {
            self.runtime
                .stop_container(&container.id, self.config.stop_timeout())
                .await?;
            self.runtime.remove_container(&container.id).await?;
            info!("Removed container {}", container.name);
            Ok(())
        })
        .await
    }

    /// Create the container, attach its networks and start it
    async fn run_container(
        &self,
        project: &ProjectSpec,
        service: &ServiceSpec,
        name: &str,
        number: u32,
    ) -> Result<()> {
        let request = create_request(project, service, name, number)?;
        let id = self.runtime.create_container(request).await?;

        let aliases = [service.name.clone()];
        for network in &service.networks {
            let network = labels::network_name(&project.name, network);
            self.runtime.connect_network(&network, &id, &aliases).await?;
        }

        self.runtime.start_container(&id).await?;
        Ok(())
    }

    async fn report_progress<F>(
        &self,
        service: &str,
        working: &str,
        done: &str,
        operation: F,
    ) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        self.progress.working(service, working);
        match operation.await {
            Ok(()) => {
                self.progress.done(service, done);
                Ok(())
            }
            Err(err) => {
                if !matches!(err, Error::Cancelled) {
                    warn!("{} failed for service '{}': {}", working, service, err);
                    self.progress.error(service, "Error");
                }
                Err(err)
            }
        }
    }
}

/// Runtime parameters for a container of `service` with instance `number`
pub(crate) fn create_request(
    project: &ProjectSpec,
    service: &ServiceSpec,
    name: &str,
    number: u32,
) -> Result<CreateContainerRequest> {
    let hash = config_hash(service)?;
    Ok(CreateContainerRequest {
        name: name.to_string(),
        image: service.image.clone(),
        command: service.command.clone(),
        environment: service.environment.clone(),
        volumes: service.volumes.clone(),
        labels: labels::container_labels(&project.name, &service.name, number, &hash),
        resources: service.resources.clone(),
        healthcheck: service.healthcheck.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConvergenceConfig, EventStatus, ProgressSink};
    use container_runtime::{
        ContainerState, InMemoryRuntime, MemoryContainer, Operation, RuntimeCall,
    };
    use std::sync::Arc;

    fn project() -> ProjectSpec {
        let mut web = ServiceSpec::new("web", "nginx:alpine");
        web.networks = vec!["default".to_string(), "backend".to_string()];
        ProjectSpec::new("demo", vec![web])
    }

    fn seeded(runtime: &InMemoryRuntime, number: &str, hash: &str) -> ContainerSummary {
        let id = runtime.seed(
            MemoryContainer::new(format!("demo_web_{}", number), ContainerState::Running)
                .with_label(labels::PROJECT, "demo")
                .with_label(labels::SERVICE, "web")
                .with_label(labels::CONTAINER_NUMBER, number)
                .with_label(labels::CONFIG_HASH, hash),
        );
        let container = runtime.container(&id).unwrap();
        ContainerSummary {
            id: container.id,
            name: container.name,
            labels: container.labels,
            state: container.state,
        }
    }

    #[test]
    fn test_create_request() {
        let project = project();
        let web = &project.services[0];
        let request = create_request(&project, web, "demo_web_3", 3).unwrap();

        assert_eq!(request.name, "demo_web_3");
        assert_eq!(request.image, "nginx:alpine");
        assert_eq!(request.labels[labels::CONTAINER_NUMBER], "3");
        assert_eq!(request.labels[labels::CONFIG_HASH], config_hash(web).unwrap());
    }

    #[test]
    fn test_create_connects_networks_then_starts() {
        smol::block_on(async {
            let runtime = Arc::new(InMemoryRuntime::new());
            let (progress, events) = ProgressSink::channel();
            let convergence = Convergence::new(runtime.clone(), ConvergenceConfig::default())
                .with_progress(progress);
            let project = project();

            convergence
                .create_container(&project, &project.services[0], "demo_web_1".to_string(), 1)
                .await
                .unwrap();

            let calls = runtime.calls();
            assert_eq!(calls[0], RuntimeCall::Create("demo_web_1".to_string()));
            assert!(matches!(
                &calls[1],
                RuntimeCall::ConnectNetwork { network, aliases, .. }
                    if network == "demo_default" && aliases == &["web".to_string()]
            ));
            assert!(matches!(
                &calls[2],
                RuntimeCall::ConnectNetwork { network, .. } if network == "demo_backend"
            ));
            assert!(matches!(&calls[3], RuntimeCall::Start(_)));

            let texts: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
                .map(|e| (e.status, e.status_text))
                .collect();
            assert_eq!(
                texts,
                vec![
                    (EventStatus::Working, "Create".to_string()),
                    (EventStatus::Done, "Created".to_string()),
                ]
            );
        });
    }

    #[test]
    fn test_recreate_order_and_number() {
        smol::block_on(async {
            let runtime = Arc::new(InMemoryRuntime::new());
            let convergence = Convergence::new(runtime.clone(), ConvergenceConfig::default());
            let project = project();
            let old = seeded(&runtime, "4", "stale");

            convergence
                .recreate_container(&project, &project.services[0], &old)
                .await
                .unwrap();

            let calls = runtime.mutations();
            assert_eq!(calls[0], RuntimeCall::Stop(old.id.clone()));
            assert_eq!(
                calls[1],
                RuntimeCall::Rename {
                    id: old.id.clone(),
                    name: format!("{}_demo_web_4", old.short_id()),
                }
            );
            assert_eq!(calls[2], RuntimeCall::Create("demo_web_4".to_string()));
            assert_eq!(calls.last(), Some(&RuntimeCall::Remove(old.id.clone())));

            let containers = runtime.containers();
            assert_eq!(containers.len(), 1);
            assert_eq!(containers[0].name, "demo_web_4");
            assert_eq!(containers[0].labels[labels::CONTAINER_NUMBER], "4");
            assert!(containers[0].state.is_running());
        });
    }

    #[test]
    fn test_recreate_keeps_old_container_when_create_fails() {
        smol::block_on(async {
            let runtime = Arc::new(InMemoryRuntime::new());
            let (progress, events) = ProgressSink::channel();
            let convergence = Convergence::new(runtime.clone(), ConvergenceConfig::default())
                .with_progress(progress);
            let project = project();
            let old = seeded(&runtime, "1", "stale");
            runtime.fail_next(Operation::Create, "image not found");

            let err = convergence
                .recreate_container(&project, &project.services[0], &old)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Runtime(_)));

            let survivor = runtime.container(&old.id).expect("old container kept");
            assert_eq!(survivor.name, format!("{}_demo_web_1", old.short_id()));
            assert!(!runtime.mutations().contains(&RuntimeCall::Remove(old.id.clone())));

            let last = std::iter::from_fn(|| events.try_recv().ok()).last().unwrap();
            assert_eq!(last.status, EventStatus::Error);
        });
    }

    #[test]
    fn test_recreate_rejects_bad_number_before_mutating() {
        smol::block_on(async {
            let runtime = Arc::new(InMemoryRuntime::new());
            let convergence = Convergence::new(runtime.clone(), ConvergenceConfig::default());
            let project = project();
            let old = seeded(&runtime, "first", "stale");

            let err = convergence
                .recreate_container(&project, &project.services[0], &old)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidContainerNumber { .. }));
            assert!(runtime.mutations().is_empty());
        });
    }

    #[test]
    fn test_recreate_restores_canonical_name() {
        smol::block_on(async {
            let runtime = Arc::new(InMemoryRuntime::new());
            let convergence = Convergence::new(runtime.clone(), ConvergenceConfig::default());
            let project = project();
            let id = runtime.seed(
                MemoryContainer::new("0123456789ab_demo_web_2", ContainerState::Exited)
                    .with_label(labels::PROJECT, "demo")
                    .with_label(labels::SERVICE, "web")
                    .with_label(labels::CONTAINER_NUMBER, "2")
                    .with_label(labels::CONFIG_HASH, "stale"),
            );
            let old = runtime.container(&id).unwrap();
            let old = ContainerSummary {
                id: old.id,
                name: old.name,
                labels: old.labels,
                state: old.state,
            };

            convergence
                .recreate_container(&project, &project.services[0], &old)
                .await
                .unwrap();

            assert!(runtime.mutations().contains(&RuntimeCall::Rename {
                id: old.id.clone(),
                name: format!("{}_demo_web_2", old.short_id()),
            }));
            let names: Vec<_> = runtime.containers().into_iter().map(|c| c.name).collect();
            assert_eq!(names, vec!["demo_web_2"]);
        });
    }

    #[test]
    fn test_recreate_of_parked_container_skips_rename() {
        smol::block_on(async {
            let runtime = Arc::new(InMemoryRuntime::new());
            let convergence = Convergence::new(runtime.clone(), ConvergenceConfig::default());
            let project = project();
            let old = seeded(&runtime, "1", "stale");
            runtime.fail_next(Operation::Create, "image not found");
            convergence
                .recreate_container(&project, &project.services[0], &old)
                .await
                .unwrap_err();

            let parked = runtime.container(&old.id).unwrap();
            let parked = ContainerSummary {
                id: parked.id,
                name: parked.name,
                labels: parked.labels,
                state: parked.state,
            };
            runtime.clear_calls();

            convergence
                .recreate_container(&project, &project.services[0], &parked)
                .await
                .unwrap();

            assert!(!runtime
                .mutations()
                .iter()
                .any(|call| matches!(call, RuntimeCall::Rename { .. })));
            let names: Vec<_> = runtime.containers().into_iter().map(|c| c.name).collect();
            assert_eq!(names, vec!["demo_web_1"]);
        });
    }

    #[test]
    fn test_remove_stops_then_deletes() {
        smol::block_on(async {
            let runtime = Arc::new(InMemoryRuntime::new());
            let (progress, events) = ProgressSink::channel();
            let convergence = Convergence::new(runtime.clone(), ConvergenceConfig::default())
                .with_progress(progress);
            let project = project();
            let old = seeded(&runtime, "2", "hash");

            convergence
                .remove_container(&project.services[0], &old)
                .await
                .unwrap();

            assert_eq!(
                runtime.mutations(),
                vec![
                    RuntimeCall::Stop(old.id.clone()),
                    RuntimeCall::Remove(old.id.clone())
                ]
            );
            assert!(runtime.containers().is_empty());

            let texts: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
                .map(|e| (e.status, e.status_text))
                .collect();
            assert_eq!(
                texts,
                vec![
                    (EventStatus::Working, "Remove".to_string()),
                    (EventStatus::Done, "Removed".to_string()),
                ]
            );
        });
    }
}
