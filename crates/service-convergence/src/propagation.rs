//! Per-pass lifecycle annotations and their propagation to dependents.
//!
//! When a service's containers are recreated, the services depending on it
//! may hold stale addresses even though their own fingerprint still matches.
//! Propagation marks those dependents so they are recreated when their turn
//! comes in the same pass. The map lives only as long as the pass.

use crate::{LifecycleStrategy, ProjectSpec, ServiceSpec};
use std::collections::HashMap;
use tracing::debug;

/// Lifecycle strategies assigned to services during one convergence pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleAnnotations {
    strategies: HashMap<String, LifecycleStrategy>,
}

impl LifecycleAnnotations {
    /// An empty annotation map
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or overwrite) the strategy of a service
    pub fn set(&mut self, service: impl Into<String>, strategy: LifecycleStrategy) {
        self.strategies.insert(service.into(), strategy);
    }

    /// Strategy assigned to a service during this pass
    pub fn get(&self, service: &str) -> Option<LifecycleStrategy> {
        self.strategies.get(service).copied()
    }

    /// Effective strategy: this pass's annotation, else the declared one
    pub fn strategy_for(&self, spec: &ServiceSpec) -> Option<LifecycleStrategy> {
        self.get(&spec.name).or(spec.lifecycle)
    }

    /// Whether every container of the service must be recreated
    pub fn force_recreate(&self, spec: &ServiceSpec) -> bool {
        self.strategy_for(spec) == Some(LifecycleStrategy::ForceRecreate)
    }

    /// Assign `strategy` to every service in the project that depends on
    /// `service`, returning the names that were marked
    pub fn propagate(
        &mut self,
        project: &ProjectSpec,
        service: &str,
        strategy: LifecycleStrategy,
    ) -> Vec<String> {
        let marked: Vec<String> = project
            .dependents_of(service)
            .map(|dependent| dependent.name.clone())
            .collect();
        for name in &marked {
            debug!("Marking {} for {:?} after {} changed", name, strategy, service);
            self.set(name.clone(), strategy);
        }
        marked
    }

    /// Number of annotated services
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Whether no service is annotated
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
