//! Dependency health gating during reconciliation

mod common;

use async_io::Timer;
use common::Fixture;
use container_runtime::{
    ContainerState, HealthCheckConfig, HealthState, MemoryContainer, RuntimeCall,
};
use service_convergence::{
    labels, CancellationToken, DependencyConfig, Error, LifecycleAnnotations, ProjectSpec,
    ServiceSpec,
};
use std::time::Duration;

fn project() -> ProjectSpec {
    let mut db = ServiceSpec::new("db", "postgres:16");
    db.healthcheck = Some(HealthCheckConfig {
        test: vec!["CMD".to_string(), "pg_isready".to_string()],
        ..Default::default()
    });
    let mut web = ServiceSpec::new("web", "nginx:alpine");
    web.depends_on
        .insert("db".to_string(), DependencyConfig::healthy());
    ProjectSpec::new("proj", vec![db, web])
}

fn seed_db(fixture: &Fixture, health: Option<HealthState>) -> String {
    let mut container = MemoryContainer::new("proj_db_1", ContainerState::Running)
        .with_label(labels::PROJECT, "proj")
        .with_label(labels::SERVICE, "db")
        .with_label(labels::CONTAINER_NUMBER, "1");
    container.health = health;
    fixture.runtime.seed(container)
}

fn creates(fixture: &Fixture) -> Vec<String> {
    fixture
        .runtime
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            RuntimeCall::Create(name) => Some(name),
            _ => None,
        })
        .collect()
}

#[smol_potat::test]
async fn test_healthy_dependency_does_not_block() {
    let fixture = Fixture::new();
    let project = project();
    seed_db(&fixture, Some(HealthState::Healthy));

    fixture
        .convergence
        .ensure_service(
            &project,
            &project.services[1],
            &mut LifecycleAnnotations::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(creates(&fixture), vec!["proj_web_1"]);
}

#[smol_potat::test]
async fn test_starting_dependency_blocks_until_cancelled() {
    let fixture = Fixture::new();
    let project = project();
    seed_db(&fixture, Some(HealthState::Starting));
    let cancel = CancellationToken::new();

    let mut annotations = LifecycleAnnotations::new();
    let converge = fixture.convergence.ensure_service(
        &project,
        &project.services[1],
        &mut annotations,
        &cancel,
    );
    let stop = async {
        Timer::after(Duration::from_millis(50)).await;
        cancel.cancel();
    };
    let (result, _) = futures::join!(converge, stop);

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(creates(&fixture).is_empty());
}

#[smol_potat::test]
async fn test_dependency_turning_healthy_unblocks() {
    let fixture = Fixture::new();
    let project = project();
    let db = seed_db(&fixture, Some(HealthState::Starting));
    let cancel = CancellationToken::new();

    let mut annotations = LifecycleAnnotations::new();
    let converge = fixture.convergence.ensure_service(
        &project,
        &project.services[1],
        &mut annotations,
        &cancel,
    );
    let flip = async {
        Timer::after(Duration::from_millis(40)).await;
        assert!(creates(&fixture).is_empty());
        fixture.runtime.set_health(&db, Some(HealthState::Healthy));
    };
    let (result, _) = futures::join!(converge, flip);

    result.unwrap();
    assert_eq!(creates(&fixture), vec!["proj_web_1"]);
}

#[smol_potat::test]
async fn test_dependency_without_healthcheck_is_an_error() {
    let fixture = Fixture::new();
    let project = project();
    seed_db(&fixture, None);

    let err = fixture
        .convergence
        .ensure_service(
            &project,
            &project.services[1],
            &mut LifecycleAnnotations::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NoHealthCheck { ref service } if service == "db"));
    assert!(fixture.runtime.mutations().is_empty());
}

#[smol_potat::test]
async fn test_project_waits_for_freshly_created_dependency() {
    let fixture = Fixture::new();
    let project = project();

    fixture
        .convergence
        .converge_project(&project, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(creates(&fixture), vec!["proj_db_1", "proj_web_1"]);
}

#[smol_potat::test]
async fn test_unhealthy_replica_keeps_waiting() {
    let fixture = Fixture::new();
    let project = project();
    fixture.runtime.set_health_on_create(HealthState::Unhealthy);
    let cancel = CancellationToken::new();

    let converge = fixture.convergence.converge_project(&project, &cancel);
    let stop = async {
        Timer::after(Duration::from_millis(50)).await;
        cancel.cancel();
    };
    let (result, _) = futures::join!(converge, stop);

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(creates(&fixture), vec!["proj_db_1"]);
}

#[smol_potat::test]
async fn test_failing_dependency_cancels_sibling_wait() {
    let fixture = Fixture::new();
    let mut web = ServiceSpec::new("web", "nginx:alpine");
    for dependency in ["cache", "db"] {
        web.depends_on
            .insert(dependency.to_string(), DependencyConfig::healthy());
    }
    let project = ProjectSpec::new(
        "proj",
        vec![
            ServiceSpec::new("cache", "redis:7"),
            ServiceSpec::new("db", "postgres:16"),
            web,
        ],
    );
    // db never becomes healthy; cache has no health check at all
    seed_db(&fixture, Some(HealthState::Starting));
    fixture.runtime.seed(
        MemoryContainer::new("proj_cache_1", ContainerState::Running)
            .with_label(labels::PROJECT, "proj")
            .with_label(labels::SERVICE, "cache")
            .with_label(labels::CONTAINER_NUMBER, "1"),
    );

    let err = fixture
        .convergence
        .health_gate()
        .wait_dependencies(&project, &project.services[2], &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NoHealthCheck { ref service } if service == "cache"));
    assert!(creates(&fixture).is_empty());
}
