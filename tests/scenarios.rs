mod support;

use std::sync::Arc;
use std::time::Duration;

use depwatch::{CheckConfig, Dependency, DependencyType, Endpoint, ProbeError};
use prometheus::Registry;
use support::{count_series, metric_value, AlwaysErrProbe, CountingProbe, HangingProbe, ScriptedProbe};

fn fast_config(failure_threshold: u32, success_threshold: u32) -> CheckConfig {
    CheckConfig {
        interval: Duration::from_millis(50),
        timeout: Duration::from_millis(200),
        initial_delay: Duration::ZERO,
        failure_threshold,
        success_threshold,
    }
}

#[tokio::test]
async fn s1_all_healthy_baseline() {
    let registry = Registry::new();
    let core = depwatch::DependencyHealth::builder()
        .name("inst")
        .group("grp")
        .registry(registry.clone())
        .dependency(depwatch::DependencySpec::new(
            Dependency::new("pg", DependencyType::Postgres, vec![Endpoint::new("pg-host", 5432)])
                .config(fast_config(1, 1)),
            Arc::new(ScriptedProbe::always_ok(DependencyType::Postgres)),
        ))
        .dependency(depwatch::DependencySpec::new(
            Dependency::new("redis", DependencyType::Redis, vec![Endpoint::new("cache", 6379)])
                .config(fast_config(1, 1)),
            Arc::new(ScriptedProbe::always_ok(DependencyType::Redis)),
        ))
        .dependency(depwatch::DependencySpec::new(
            Dependency::new("api", DependencyType::Http, vec![Endpoint::new("api", 80)])
                .config(fast_config(1, 1)),
            Arc::new(ScriptedProbe::always_ok(DependencyType::Http)),
        ))
        .build()
        .unwrap();

    core.start().unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let health = core.health();
    assert_eq!(health.len(), 3);
    assert!(health.values().all(|h| *h));

    assert_eq!(count_series(&registry, "app_dependency_health"), 3);
    assert_eq!(count_series(&registry, "app_dependency_status"), 24);
    for (dep, host) in [("pg", "pg-host"), ("redis", "cache"), ("api", "api")] {
        assert_eq!(
            metric_value(&registry, "app_dependency_status_detail", &[("dependency", dep), ("host", host), ("detail", "ok")]),
            Some(1.0)
        );
    }

    core.stop().await.unwrap();
}

#[tokio::test]
async fn s2_connection_refused() {
    let registry = Registry::new();
    let core = depwatch::DependencyHealth::builder()
        .name("inst")
        .group("grp")
        .registry(registry.clone())
        .dependency(depwatch::DependencySpec::new(
            Dependency::new("svc", DependencyType::Tcp, vec![Endpoint::new("127.0.0.1", 1)]).config(fast_config(1, 1)),
            Arc::new(depwatch::probe::tcp::TcpProbe::new()),
        ))
        .build()
        .unwrap();

    core.start().unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(metric_value(&registry, "app_dependency_health", &[("dependency", "svc")]), Some(0.0));
    assert_eq!(
        metric_value(&registry, "app_dependency_status", &[("dependency", "svc"), ("status", "connection_error")]),
        Some(1.0)
    );
    assert_eq!(
        metric_value(&registry, "app_dependency_status_detail", &[("dependency", "svc"), ("detail", "connection_refused")]),
        Some(1.0)
    );

    core.stop().await.unwrap();
}

#[tokio::test]
async fn s3_http_503_then_401_deletes_old_detail() {
    let registry = Registry::new();
    let script = vec![
        Err(ProbeError::Unhealthy("http_503".to_string())),
        Err(ProbeError::Auth),
    ];
    let core = depwatch::DependencyHealth::builder()
        .name("inst")
        .group("grp")
        .registry(registry.clone())
        .dependency(depwatch::DependencySpec::new(
            Dependency::new("api", DependencyType::Http, vec![Endpoint::new("api", 80)]).config(fast_config(1, 1)),
            Arc::new(ScriptedProbe::new(DependencyType::Http, script)),
        ))
        .build()
        .unwrap();

    core.start().unwrap();
    tokio::time::sleep(Duration::from_millis(70)).await;
    assert_eq!(
        metric_value(&registry, "app_dependency_status_detail", &[("dependency", "api"), ("detail", "http_503")]),
        Some(1.0)
    );

    tokio::time::sleep(Duration::from_millis(70)).await;
    assert_eq!(
        metric_value(&registry, "app_dependency_status_detail", &[("dependency", "api"), ("detail", "http_503")]),
        None,
        "stale detail series must be deleted on change"
    );
    assert_eq!(
        metric_value(&registry, "app_dependency_status_detail", &[("dependency", "api"), ("detail", "auth_error")]),
        Some(1.0)
    );

    core.stop().await.unwrap();
}

#[tokio::test]
async fn s4_dynamic_swap_leaves_no_lingering_series() {
    let registry = Registry::new();
    let core = depwatch::DependencyHealth::builder()
        .name("inst")
        .group("grp")
        .registry(registry.clone())
        .build()
        .unwrap();

    core.start().unwrap();
    core.add_endpoint(
        "x",
        DependencyType::Tcp,
        true,
        Endpoint::new("a", 1),
        Arc::new(AlwaysErrProbe::new(DependencyType::Tcp, || ProbeError::ConnectionRefused)),
        fast_config(1, 1),
    )
    .unwrap();
    tokio::time::sleep(Duration::from_millis(70)).await;

    core.update_endpoint(
        "x",
        "a",
        1,
        Endpoint::new("b", 2),
        Arc::new(AlwaysErrProbe::new(DependencyType::Tcp, || ProbeError::ConnectionRefused)),
    )
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(70)).await;

    assert_eq!(metric_value(&registry, "app_dependency_health", &[("host", "a"), ("port", "1")]), None);
    assert_eq!(metric_value(&registry, "app_dependency_health", &[("host", "b"), ("port", "2")]), Some(0.0));

    core.stop().await.unwrap();
}

#[tokio::test]
async fn s5_threshold_hysteresis() {
    let registry = Registry::new();
    let script = vec![
        Err(ProbeError::Unhealthy("unhealthy".to_string())),
        Err(ProbeError::Unhealthy("unhealthy".to_string())),
        Err(ProbeError::Unhealthy("unhealthy".to_string())),
        Ok(()),
        Ok(()),
        Ok(()),
    ];
    let core = depwatch::DependencyHealth::builder()
        .name("inst")
        .group("grp")
        .registry(registry.clone())
        .dependency(depwatch::DependencySpec::new(
            Dependency::new("svc", DependencyType::Tcp, vec![Endpoint::new("h", 1)]).config(fast_config(3, 2)),
            Arc::new(ScriptedProbe::new(DependencyType::Tcp, script)),
        ))
        .build()
        .unwrap();

    core.start().unwrap();

    tokio::time::sleep(Duration::from_millis(170)).await;
    assert_eq!(metric_value(&registry, "app_dependency_health", &[("dependency", "svc")]), Some(0.0));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(metric_value(&registry, "app_dependency_health", &[("dependency", "svc")]), Some(1.0));

    core.stop().await.unwrap();
}

#[tokio::test]
async fn s6_graceful_shutdown_under_load() {
    let registry = Registry::new();
    let mut builder = depwatch::DependencyHealth::builder().name("inst").group("grp").registry(registry.clone());
    for i in 0..64 {
        builder = builder.dependency(depwatch::DependencySpec::new(
            Dependency::new(format!("svc{i}"), DependencyType::Tcp, vec![Endpoint::new("10.255.255.1", 1)])
                .config(CheckConfig {
                    interval: Duration::from_secs(1),
                    timeout: Duration::from_secs(5),
                    initial_delay: Duration::ZERO,
                    failure_threshold: 1,
                    success_threshold: 1,
                }),
            Arc::new(HangingProbe::new(DependencyType::Tcp)),
        ));
    }
    let core = builder.build().unwrap();
    core.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = std::time::Instant::now();
    core.stop().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(6), "stop() must complete within timeout + epsilon");
}

#[tokio::test]
async fn add_endpoint_twice_is_idempotent() {
    let core = depwatch::DependencyHealth::builder().name("inst").group("grp").build().unwrap();
    core.start().unwrap();

    let probe = Arc::new(CountingProbe::new(DependencyType::Tcp));
    core.add_endpoint("x", DependencyType::Tcp, false, Endpoint::new("h", 1), probe.clone(), fast_config(1, 1)).unwrap();
    core.add_endpoint("x", DependencyType::Tcp, false, Endpoint::new("h", 1), probe.clone(), fast_config(1, 1)).unwrap();

    assert_eq!(core.health_details().len(), 1);
    core.stop().await.unwrap();
}

#[tokio::test]
async fn remove_endpoint_twice_is_idempotent() {
    let core = depwatch::DependencyHealth::builder().name("inst").group("grp").build().unwrap();
    core.start().unwrap();
    core.add_endpoint(
        "x",
        DependencyType::Tcp,
        false,
        Endpoint::new("h", 1),
        Arc::new(CountingProbe::new(DependencyType::Tcp)),
        fast_config(1, 1),
    )
    .unwrap();

    core.remove_endpoint("x", "h", 1).await.unwrap();
    core.remove_endpoint("x", "h", 1).await.unwrap();
    assert_eq!(core.health_details().len(), 0);
}

#[tokio::test]
async fn add_endpoint_after_stop_fails() {
    let core = depwatch::DependencyHealth::builder().name("inst").group("grp").build().unwrap();
    core.start().unwrap();
    core.stop().await.unwrap();

    let result = core.add_endpoint(
        "x",
        DependencyType::Tcp,
        false,
        Endpoint::new("h", 1),
        Arc::new(CountingProbe::new(DependencyType::Tcp)),
        fast_config(1, 1),
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn update_endpoint_missing_key_fails() {
    let core = depwatch::DependencyHealth::builder().name("inst").group("grp").build().unwrap();
    core.start().unwrap();

    let result = core
        .update_endpoint("missing", "h", 1, Endpoint::new("h2", 2), Arc::new(CountingProbe::new(DependencyType::Tcp)))
        .await;
    assert!(matches!(result, Err(depwatch::ConfigError::EndpointNotFound(_))));
}
