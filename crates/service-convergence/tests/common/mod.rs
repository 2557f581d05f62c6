//! Shared fixtures for convergence integration tests

#![allow(dead_code)]

use container_runtime::{ContainerState, InMemoryRuntime, MemoryContainer};
use service_convergence::{
    labels, Convergence, ConvergenceConfig, ProgressEvent, ProgressSink, ProjectSpec, ServiceSpec,
};
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Everything a test needs to drive one convergence engine
pub struct Fixture {
    pub runtime: Arc<InMemoryRuntime>,
    pub convergence: Convergence,
    pub events: async_channel::Receiver<ProgressEvent>,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let runtime = Arc::new(InMemoryRuntime::new());
        let (progress, events) = ProgressSink::channel();
        let config = ConvergenceConfig {
            health_poll_interval_ms: 10,
            ..Default::default()
        };
        let convergence = Convergence::new(runtime.clone(), config).with_progress(progress);
        Self {
            runtime,
            convergence,
            events,
        }
    }

    /// Drain the progress events emitted so far
    pub fn drain_events(&self) -> Vec<ProgressEvent> {
        std::iter::from_fn(|| self.events.try_recv().ok()).collect()
    }

    /// Containers of one service, in listing order
    pub fn service_containers(&self, project: &str, service: &str) -> Vec<MemoryContainer> {
        let filter = labels::service_filter(project, service);
        self.runtime
            .containers()
            .into_iter()
            .filter(|c| filter.matches(&c.labels))
            .collect()
    }

    /// Instance numbers of one service's containers, sorted
    pub fn numbers(&self, project: &str, service: &str) -> Vec<u32> {
        let mut numbers: Vec<u32> = self
            .service_containers(project, service)
            .iter()
            .map(|c| c.labels[labels::CONTAINER_NUMBER].parse().unwrap())
            .collect();
        numbers.sort_unstable();
        numbers
    }

    /// Seed a container as if an earlier pass had created it
    pub fn seed(
        &self,
        project: &str,
        service: &str,
        number: u32,
        hash: &str,
        state: ContainerState,
    ) -> String {
        self.runtime.seed(
            MemoryContainer::new(labels::container_name(project, service, number), state)
                .with_label(labels::PROJECT, project)
                .with_label(labels::SERVICE, service)
                .with_label(labels::CONTAINER_NUMBER, number.to_string())
                .with_label(labels::CONFIG_HASH, hash),
        )
    }
}

/// A web service on the default network
pub fn web(scale: u32) -> ServiceSpec {
    let mut spec = ServiceSpec::new("web", "nginx:alpine");
    spec.scale = scale;
    spec.networks = vec!["default".to_string()];
    spec
}

/// A single-service project
pub fn project_with(service: ServiceSpec) -> ProjectSpec {
    ProjectSpec::new("proj", vec![service])
}
