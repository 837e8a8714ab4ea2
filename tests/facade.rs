use std::sync::Arc;
use std::time::Duration;

use depwatch::{CheckConfig, Dependency, DependencyType, DependencySpec, Endpoint};
use prometheus::Registry;
use serial_test::serial;

mod support;
use support::{metric_value, ScriptedProbe};

fn fast_config() -> CheckConfig {
    CheckConfig {
        interval: Duration::from_millis(50),
        timeout: Duration::from_millis(200),
        initial_delay: Duration::ZERO,
        failure_threshold: 1,
        success_threshold: 1,
    }
}

#[test]
#[serial]
fn critical_overlay_from_environment() {
    std::env::set_var("DEPHEALTH_PG_CRITICAL", "yes");
    let core = depwatch::DependencyHealth::builder()
        .name("inst")
        .group("grp")
        .dependency(DependencySpec::new(
            Dependency::new("pg", DependencyType::Postgres, vec![Endpoint::new("h", 5432)]),
            Arc::new(ScriptedProbe::always_ok(DependencyType::Postgres)),
        ))
        .build()
        .unwrap();
    std::env::remove_var("DEPHEALTH_PG_CRITICAL");

    let details = core.health_details();
    let status = details.get("pg:h:5432").expect("endpoint must be registered");
    assert!(status.critical, "DEPHEALTH_PG_CRITICAL=yes must flip the dependency's critical flag");
}

#[test]
#[serial]
fn invalid_critical_overlay_is_rejected() {
    std::env::set_var("DEPHEALTH_PG_CRITICAL", "maybe");
    let result = depwatch::DependencyHealth::builder()
        .name("inst")
        .group("grp")
        .dependency(DependencySpec::new(
            Dependency::new("pg", DependencyType::Postgres, vec![Endpoint::new("h", 5432)]),
            Arc::new(ScriptedProbe::always_ok(DependencyType::Postgres)),
        ))
        .build();
    std::env::remove_var("DEPHEALTH_PG_CRITICAL");

    assert!(result.is_err());
}

#[tokio::test]
#[serial]
async fn label_overlay_from_environment() {
    std::env::set_var("DEPHEALTH_PG_LABEL_REGION", "us-east");
    let registry = Registry::new();
    let core = depwatch::DependencyHealth::builder()
        .name("inst")
        .group("grp")
        .registry(registry.clone())
        .dependency(DependencySpec::new(
            Dependency::new("pg", DependencyType::Postgres, vec![Endpoint::new("h", 5432)]).config(fast_config()),
            Arc::new(ScriptedProbe::always_ok(DependencyType::Postgres)),
        ))
        .build()
        .unwrap();
    std::env::remove_var("DEPHEALTH_PG_LABEL_REGION");

    core.start().unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(
        metric_value(&registry, "app_dependency_health", &[("dependency", "pg"), ("region", "us-east")]),
        Some(1.0),
        "DEPHEALTH_PG_LABEL_REGION=us-east must appear as a custom label on exported series"
    );

    core.stop().await.unwrap();
}

#[test]
#[serial]
fn name_and_group_required_without_env() {
    std::env::remove_var("DEPHEALTH_NAME");
    std::env::remove_var("DEPHEALTH_GROUP");
    let result = depwatch::DependencyHealth::builder().build();
    assert!(result.is_err());
}
