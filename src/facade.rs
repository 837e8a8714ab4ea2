//! Public composition root: instance identity, environment overlays, dependency specs.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;

use crate::error::ConfigError;
use crate::metrics::Exporter;
use crate::model::{validate_identity, CheckConfig, Dependency, Endpoint};
use crate::probe::Probe;
use crate::scheduler::Scheduler;
use crate::status::EndpointStatus;

/// One dependency declared to the facade, before environment overlays are applied.
pub struct DependencySpec {
    pub dependency: Dependency,
    pub probe: Arc<dyn Probe>,
}

impl DependencySpec {
    pub fn new(dependency: Dependency, probe: Arc<dyn Probe>) -> Self {
        DependencySpec { dependency, probe }
    }
}

pub struct DependencyHealthBuilder {
    name: Option<String>,
    group: Option<String>,
    specs: Vec<DependencySpec>,
    check_interval: Option<Duration>,
    timeout: Option<Duration>,
    registry: Option<Registry>,
}

impl Default for DependencyHealthBuilder {
    fn default() -> Self {
        DependencyHealthBuilder {
            name: None,
            group: None,
            specs: Vec::new(),
            check_interval: None,
            timeout: None,
            registry: None,
        }
    }
}

impl DependencyHealthBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn dependency(mut self, spec: DependencySpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = Some(interval);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Result<DependencyHealth, ConfigError> {
        let name = self
            .name
            .or_else(|| std::env::var("DEPHEALTH_NAME").ok())
            .ok_or_else(|| ConfigError::InvalidName("instance name not provided and DEPHEALTH_NAME unset".to_string()))?;
        let group = self
            .group
            .or_else(|| std::env::var("DEPHEALTH_GROUP").ok())
            .ok_or_else(|| ConfigError::InvalidName("instance group not provided and DEPHEALTH_GROUP unset".to_string()))?;
        validate_identity(&name, "instance name")?;
        validate_identity(&group, "instance group")?;

        let mut specs = Vec::new();
        for spec in self.specs {
            let mut dependency = apply_env_overlays(spec.dependency)?;

            // Resolve interval/timeout precedence: spec > facade-global > defaults. A
            // dependency that never called `.config()` has no explicit opinion, so the
            // builder-global override (if any) applies; one that did call `.config()` wins
            // outright, even if the value it chose happens to equal `CheckConfig::default()`.
            if !dependency.config_overridden {
                let mut config = dependency.config;
                if let Some(global_interval) = self.check_interval {
                    config.interval = global_interval;
                }
                if let Some(global_timeout) = self.timeout {
                    config.timeout = global_timeout;
                }
                dependency.config = config;
            }
            dependency.config.validate()?;
            dependency.validate()?;

            specs.push(DependencySpec::new(dependency, spec.probe));
        }

        let custom_labels = sorted_custom_label_union(specs.iter().map(|s| &s.dependency));
        let registry = self.registry.unwrap_or_else(Registry::new);
        let exporter = Arc::new(
            Exporter::new(registry, custom_labels)
                .map_err(|e| ConfigError::InvalidConfigRange(format!("failed to build exporter: {e}")))?,
        );

        let scheduler = Arc::new(Scheduler::new(name, group, exporter));
        for spec in specs {
            scheduler.add(spec.dependency, spec.probe)?;
        }
        Ok(DependencyHealth { scheduler })
    }
}

/// `DEPHEALTH_<DEP>_CRITICAL` and `DEPHEALTH_<DEP>_LABEL_<KEY>` overlays, where `<DEP>` is
/// the dependency name upper-cased with hyphens turned into underscores.
fn apply_env_overlays(mut dependency: Dependency) -> Result<Dependency, ConfigError> {
    let env_prefix = dependency.name.to_uppercase().replace('-', "_");

    if let Ok(value) = std::env::var(format!("DEPHEALTH_{env_prefix}_CRITICAL")) {
        dependency.critical = match value.to_lowercase().as_str() {
            "yes" => true,
            "no" => false,
            other => {
                return Err(ConfigError::InvalidConfigRange(format!(
                    "DEPHEALTH_{env_prefix}_CRITICAL must be yes/no, got '{other}'"
                )))
            }
        };
    }

    let label_prefix = format!("DEPHEALTH_{env_prefix}_LABEL_");
    for (key, value) in std::env::vars() {
        if let Some(label_key) = key.strip_prefix(&label_prefix) {
            let label_key = label_key.to_lowercase();
            crate::model::validate_custom_label(&label_key)?;
            dependency.labels.insert(label_key, value);
        }
    }

    Ok(dependency)
}

fn sorted_custom_label_union<'a>(dependencies: impl Iterator<Item = &'a Dependency>) -> Vec<String> {
    let mut labels: BTreeSet<String> = BTreeSet::new();
    for dep in dependencies {
        labels.extend(dep.labels.keys().cloned());
        for endpoint in &dep.endpoints {
            labels.extend(endpoint.labels.keys().cloned());
        }
    }
    labels.into_iter().collect()
}

/// Composes the exporter and the scheduler behind the operations named in the spec:
/// `start/stop/health/health_details/add_endpoint/remove_endpoint/update_endpoint`.
pub struct DependencyHealth {
    scheduler: Arc<Scheduler>,
}

impl DependencyHealth {
    pub fn builder() -> DependencyHealthBuilder {
        DependencyHealthBuilder::new()
    }

    pub fn start(&self) -> Result<(), ConfigError> {
        self.scheduler.start()
    }

    pub async fn stop(&self) -> Result<(), ConfigError> {
        self.scheduler.stop().await
    }

    pub fn health(&self) -> HashMap<String, bool> {
        self.scheduler.health()
    }

    pub fn health_details(&self) -> HashMap<String, EndpointStatus> {
        self.scheduler.health_details()
    }

    pub fn registry(&self) -> Registry {
        self.scheduler.exporter().registry().clone()
    }

    /// Prometheus text exposition format for every series in this instance's registry.
    pub fn metrics_text(&self) -> prometheus::Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry().gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus text encoding is valid utf-8"))
    }

    pub fn add_endpoint(
        &self,
        name: &str,
        kind: crate::model::DependencyType,
        critical: bool,
        endpoint: Endpoint,
        probe: Arc<dyn Probe>,
        config: CheckConfig,
    ) -> Result<(), ConfigError> {
        self.scheduler.add_endpoint(name, kind, critical, endpoint, probe, config)
    }

    pub async fn remove_endpoint(&self, name: &str, host: &str, port: u16) -> Result<(), ConfigError> {
        self.scheduler.remove_endpoint(name, host, port).await
    }

    pub async fn update_endpoint(
        &self,
        name: &str,
        old_host: &str,
        old_port: u16,
        new_endpoint: Endpoint,
        probe: Arc<dyn Probe>,
    ) -> Result<(), ConfigError> {
        self.scheduler.update_endpoint(name, old_host, old_port, new_endpoint, probe).await
    }
}
