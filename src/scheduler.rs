//! Per-endpoint probe loops: thresholds, status bookkeeping, dynamic add/remove/update.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{classify, ConfigError, ProbeError, StatusCategory};
use crate::metrics::Exporter;
use crate::model::{CheckConfig, Dependency, Endpoint, EndpointKey};
use crate::probe::Probe;
use crate::status::EndpointStatus;

/// Mutable per-endpoint bookkeeping the probe loop advances each cycle.
#[derive(Debug, Clone)]
struct EndpointState {
    healthy: Option<bool>,
    consecutive_successes: u32,
    consecutive_failures: u32,
    last_category: StatusCategory,
    last_detail: String,
    last_latency: Duration,
    last_checked_at: Option<chrono::DateTime<Utc>>,
}

impl Default for EndpointState {
    fn default() -> Self {
        EndpointState {
            healthy: None,
            consecutive_successes: 0,
            consecutive_failures: 0,
            last_category: StatusCategory::Ok,
            last_detail: "unknown".to_string(),
            last_latency: Duration::ZERO,
            last_checked_at: None,
        }
    }
}

struct EndpointEntry {
    dependency_name: String,
    kind: crate::model::DependencyType,
    critical: bool,
    endpoint: Endpoint,
    state: EndpointState,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

struct DependencyEntry {
    dependency: Dependency,
    probe: Arc<dyn Probe>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
enum RunState {
    Stopped,
    Running,
}

/// Owns the live set of dependencies, their probes, and one cancellable loop per endpoint.
pub struct Scheduler {
    instance: String,
    group: String,
    exporter: Arc<Exporter>,
    dependencies: Mutex<HashMap<String, DependencyEntry>>,
    entries: Mutex<HashMap<EndpointKey, EndpointEntry>>,
    run_state: Mutex<RunState>,
}

impl Scheduler {
    pub fn new(instance: impl Into<String>, group: impl Into<String>, exporter: Arc<Exporter>) -> Self {
        Scheduler {
            instance: instance.into(),
            group: group.into(),
            exporter,
            dependencies: Mutex::new(HashMap::new()),
            entries: Mutex::new(HashMap::new()),
            run_state: Mutex::new(RunState::Stopped),
        }
    }

    pub fn exporter(&self) -> &Arc<Exporter> {
        &self.exporter
    }

    /// Admits a dependency before `start()`; validated per the data-model rules.
    pub fn add(&self, dependency: Dependency, probe: Arc<dyn Probe>) -> Result<(), ConfigError> {
        dependency.validate()?;
        let mut deps = self.dependencies.lock().expect("dependencies mutex poisoned");
        deps.insert(dependency.name.clone(), DependencyEntry { dependency, probe });
        Ok(())
    }

    /// Spawns one independent probe loop per endpoint of every admitted dependency.
    pub fn start(self: &Arc<Self>) -> Result<(), ConfigError> {
        let mut run_state = self.run_state.lock().expect("run_state mutex poisoned");
        if *run_state == RunState::Running {
            return Ok(());
        }

        let deps = self.dependencies.lock().expect("dependencies mutex poisoned");
        let mut entries = self.entries.lock().expect("entries mutex poisoned");
        for dep_entry in deps.values() {
            for endpoint in &dep_entry.dependency.endpoints {
                let key = endpoint.key(&dep_entry.dependency.name);
                self.spawn_loop(&mut entries, key, dep_entry, endpoint.clone());
            }
        }
        *run_state = RunState::Running;
        Ok(())
    }

    fn spawn_loop(
        self: &Arc<Self>,
        entries: &mut HashMap<EndpointKey, EndpointEntry>,
        key: EndpointKey,
        dep_entry: &DependencyEntry,
        endpoint: Endpoint,
    ) {
        let cancel = CancellationToken::new();
        let this = Arc::clone(self);
        let loop_key = key.clone();
        let probe = Arc::clone(&dep_entry.probe);
        let dependency_name = dep_entry.dependency.name.clone();
        let config = dep_entry.dependency.config;
        let loop_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            this.run_probe_loop(loop_key, probe, config, loop_cancel).await;
        });

        entries.insert(
            key,
            EndpointEntry {
                dependency_name,
                kind: dep_entry.dependency.kind,
                critical: dep_entry.dependency.critical,
                endpoint,
                state: EndpointState::default(),
                cancel,
                handle: Some(handle),
            },
        );
    }

    async fn run_probe_loop(
        self: Arc<Self>,
        key: EndpointKey,
        probe: Arc<dyn Probe>,
        config: CheckConfig,
        cancel: CancellationToken,
    ) {
        tokio::select! {
            _ = tokio::time::sleep(config.initial_delay) => {}
            _ = cancel.cancelled() => return,
        }

        loop {
            if cancel.is_cancelled() {
                return;
            }

            let t0 = Instant::now();
            let outcome = {
                let endpoint = {
                    let entries = self.entries.lock().expect("entries mutex poisoned");
                    match entries.get(&key) {
                        Some(entry) => entry.endpoint.clone(),
                        None => return,
                    }
                };

                let probe_call = probe.check(&endpoint);
                tokio::select! {
                    result = tokio::time::timeout(config.timeout, probe_call) => {
                        match result {
                            Ok(inner) => inner,
                            Err(_) => Err(ProbeError::Timeout),
                        }
                    }
                    _ = cancel.cancelled() => return,
                }
            };
            let elapsed = t0.elapsed();
            let (category, detail) = classify(&outcome);

            self.record_cycle(&key, &config, category, detail, elapsed);

            tokio::select! {
                _ = tokio::time::sleep(config.interval) => {}
                _ = cancel.cancelled() => return,
            }
        }
    }

    fn record_cycle(
        &self,
        key: &EndpointKey,
        config: &CheckConfig,
        category: StatusCategory,
        detail: String,
        elapsed: Duration,
    ) {
        let deps = self.dependencies.lock().expect("dependencies mutex poisoned");
        let mut entries = self.entries.lock().expect("entries mutex poisoned");
        let Some(entry) = entries.get_mut(key) else { return };
        let Some(dep_entry) = deps.get(&entry.dependency_name) else { return };

        self.exporter.observe_latency(&self.instance, &self.group, &dep_entry.dependency, &entry.endpoint, elapsed.as_secs_f64());
        self.exporter.set_status(&self.instance, &self.group, &dep_entry.dependency, &entry.endpoint, category);
        self.exporter.set_status_detail(key, &self.instance, &self.group, &dep_entry.dependency, &entry.endpoint, &detail);

        entry.state.last_category = category;
        entry.state.last_detail = detail;
        entry.state.last_latency = elapsed;
        entry.state.last_checked_at = Some(Utc::now());

        if category == StatusCategory::Ok {
            entry.state.consecutive_successes += 1;
            entry.state.consecutive_failures = 0;
            if entry.state.consecutive_successes >= config.success_threshold {
                if entry.state.healthy != Some(true) {
                    tracing::info!(endpoint = %key, "endpoint transitioned to healthy");
                }
                entry.state.healthy = Some(true);
                self.exporter.set_health(&self.instance, &self.group, &dep_entry.dependency, &entry.endpoint, true);
            }
        } else {
            entry.state.consecutive_failures += 1;
            entry.state.consecutive_successes = 0;
            tracing::debug!(endpoint = %key, %category, "check cycle failed");
            if entry.state.consecutive_failures >= config.failure_threshold {
                if entry.state.healthy != Some(false) {
                    tracing::warn!(endpoint = %key, "endpoint transitioned to unhealthy");
                }
                entry.state.healthy = Some(false);
                self.exporter.set_health(&self.instance, &self.group, &dep_entry.dependency, &entry.endpoint, false);
            }
        }
    }

    /// Cancels every loop and awaits its termination. Idempotent after the first call.
    pub async fn stop(&self) -> Result<(), ConfigError> {
        {
            let mut run_state = self.run_state.lock().expect("run_state mutex poisoned");
            if *run_state == RunState::Stopped {
                return Ok(());
            }
            *run_state = RunState::Stopped;
        }

        let handles: Vec<JoinHandle<()>> = {
            let mut entries = self.entries.lock().expect("entries mutex poisoned");
            entries
                .values_mut()
                .filter_map(|entry| {
                    entry.cancel.cancel();
                    entry.handle.take()
                })
                .collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }

    /// Dynamic admission after start. Idempotent: a silent no-op if the key already exists.
    pub fn add_endpoint(
        self: &Arc<Self>,
        name: &str,
        kind: crate::model::DependencyType,
        critical: bool,
        endpoint: Endpoint,
        probe: Arc<dyn Probe>,
        config: CheckConfig,
    ) -> Result<(), ConfigError> {
        if *self.run_state.lock().expect("run_state mutex poisoned") != RunState::Running {
            return Err(ConfigError::NotRunning);
        }
        config.validate()?;
        if endpoint.host.is_empty() {
            return Err(ConfigError::InvalidName("endpoint host must not be empty".to_string()));
        }
        for label_key in endpoint.labels.keys() {
            crate::model::validate_custom_label(label_key)?;
        }

        let key = endpoint.key(name);
        let mut entries = self.entries.lock().expect("entries mutex poisoned");
        if entries.contains_key(&key) {
            return Ok(());
        }

        {
            let mut deps = self.dependencies.lock().expect("dependencies mutex poisoned");
            deps.entry(name.to_string()).or_insert_with(|| DependencyEntry {
                dependency: Dependency::new(name, kind, vec![]).critical(critical).config(config),
                probe: Arc::clone(&probe),
            });
        }

        let dep_entry_probe = Arc::clone(&probe);
        let cancel = CancellationToken::new();
        let this = Arc::clone(self);
        let loop_key = key.clone();
        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            this.run_probe_loop(loop_key, dep_entry_probe, config, loop_cancel).await;
        });

        entries.insert(
            key,
            EndpointEntry {
                dependency_name: name.to_string(),
                kind,
                critical,
                endpoint,
                state: EndpointState::default(),
                cancel,
                handle: Some(handle),
            },
        );

        tracing::info!(dependency = name, "dynamic endpoint admitted");
        Ok(())
    }

    /// Cancels the loop, awaits it, then deletes the state record and all its metric series.
    /// Idempotent: removing an absent key is a no-op.
    pub async fn remove_endpoint(&self, name: &str, host: &str, port: u16) -> Result<(), ConfigError> {
        let key = EndpointKey { dependency: name.to_string(), host: host.to_string(), port };

        let (handle, removed) = {
            let mut entries = self.entries.lock().expect("entries mutex poisoned");
            match entries.remove(&key) {
                Some(mut entry) => {
                    entry.cancel.cancel();
                    (entry.handle.take(), Some(entry))
                }
                None => return Ok(()),
            }
        };

        if let Some(handle) = handle {
            let _ = handle.await;
        }

        if let Some(entry) = removed {
            let deps = self.dependencies.lock().expect("dependencies mutex poisoned");
            if let Some(dep_entry) = deps.get(name) {
                self.exporter.remove_endpoint(&key, &self.instance, &self.group, &dep_entry.dependency, &entry.endpoint);
            }
        }
        Ok(())
    }

    /// Atomic remove-then-add. Fails with `EndpointNotFound` if the old key does not exist.
    pub async fn update_endpoint(
        self: &Arc<Self>,
        name: &str,
        old_host: &str,
        old_port: u16,
        new_endpoint: Endpoint,
        probe: Arc<dyn Probe>,
    ) -> Result<(), ConfigError> {
        let old_key = EndpointKey { dependency: name.to_string(), host: old_host.to_string(), port: old_port };
        let (kind, critical, config) = {
            let entries = self.entries.lock().expect("entries mutex poisoned");
            let deps = self.dependencies.lock().expect("dependencies mutex poisoned");
            if !entries.contains_key(&old_key) {
                return Err(ConfigError::EndpointNotFound(old_key.to_string()));
            }
            let dep_entry = deps
                .get(name)
                .ok_or_else(|| ConfigError::EndpointNotFound(old_key.to_string()))?;
            (dep_entry.dependency.kind, dep_entry.dependency.critical, dep_entry.dependency.config)
        };

        self.remove_endpoint(name, old_host, old_port).await?;
        self.add_endpoint(name, kind, critical, new_endpoint, probe, config)
    }

    /// `dependency -> bool`. A dependency is healthy iff at least one endpoint is healthy;
    /// `unknown` endpoints contribute neither `true` nor `false`.
    pub fn health(&self) -> HashMap<String, bool> {
        let entries = self.entries.lock().expect("entries mutex poisoned");
        let mut result: HashMap<String, bool> = HashMap::new();
        for entry in entries.values() {
            let healthy = result.entry(entry.dependency_name.clone()).or_insert(false);
            if entry.state.healthy == Some(true) {
                *healthy = true;
            }
        }
        result
    }

    /// Snapshot mapping `"name:host:port" -> EndpointStatus`.
    pub fn health_details(&self) -> HashMap<String, EndpointStatus> {
        let entries = self.entries.lock().expect("entries mutex poisoned");
        let mut result = HashMap::new();
        for (key, entry) in entries.iter() {
            result.insert(
                key.to_string(),
                EndpointStatus {
                    healthy: entry.state.healthy,
                    status: entry.state.last_category.as_str().to_string(),
                    detail: entry.state.last_detail.clone(),
                    latency_ms: EndpointStatus::latency_millis(entry.state.last_latency),
                    kind: entry.kind,
                    name: entry.dependency_name.clone(),
                    host: entry.endpoint.host.clone(),
                    port: entry.endpoint.port,
                    critical: entry.critical,
                    last_checked_at: entry.state.last_checked_at,
                    labels: entry.endpoint.labels.clone(),
                },
            );
        }
        result
    }
}
