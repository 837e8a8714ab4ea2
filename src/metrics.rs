//! Prometheus exporter: four coordinated metric families with a delete-on-change
//! invariant on the `detail` series, keyed by the base label tuple plus custom labels.

use std::collections::BTreeMap;
use std::sync::Mutex;

use prometheus::{GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};

use crate::error::StatusCategory;
use crate::model::{Dependency, Endpoint, EndpointKey};

const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

/// Base label names, in the fixed order the exposition format requires.
fn base_label_names(custom: &[String]) -> Vec<String> {
    let mut names: Vec<String> = vec!["name", "group", "dependency", "type", "host", "port", "critical"]
        .into_iter()
        .map(String::from)
        .collect();
    names.extend(custom.iter().cloned());
    names
}

pub struct Exporter {
    registry: Registry,
    custom_labels: Vec<String>,
    health: GaugeVec,
    latency: HistogramVec,
    status: GaugeVec,
    status_detail: GaugeVec,
    /// Previous `detail` label-tuple per endpoint, so the next `set_status_detail`
    /// can delete the stale series before inserting the new one.
    previous_detail: Mutex<BTreeMap<EndpointKey, String>>,
}

impl Exporter {
    /// `custom_labels` is the sorted union of custom label keys across all registered
    /// dependencies; endpoints that omit one get the empty string in that slot.
    pub fn new(registry: Registry, custom_labels: Vec<String>) -> prometheus::Result<Self> {
        let mut base = base_label_names(&custom_labels);
        let base_refs: Vec<&str> = base.iter().map(String::as_str).collect();

        let health = GaugeVec::new(
            Opts::new("app_dependency_health", "Health status of a dependency (1 = healthy, 0 = unhealthy)"),
            &base_refs,
        )?;

        let latency = HistogramVec::new(
            HistogramOpts::new(
                "app_dependency_latency_seconds",
                "Latency of dependency health check in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &base_refs,
        )?;

        base.push("status".to_string());
        let status_labels: Vec<&str> = base.iter().map(String::as_str).collect();
        let status = GaugeVec::new(
            Opts::new("app_dependency_status", "Category of the last check result"),
            &status_labels,
        )?;
        base.pop();

        base.push("detail".to_string());
        let detail_labels: Vec<&str> = base.iter().map(String::as_str).collect();
        let status_detail = GaugeVec::new(
            Opts::new("app_dependency_status_detail", "Detailed reason of the last check result"),
            &detail_labels,
        )?;

        registry.register(Box::new(health.clone()))?;
        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(status.clone()))?;
        registry.register(Box::new(status_detail.clone()))?;

        Ok(Exporter {
            registry,
            custom_labels,
            health,
            latency,
            status,
            status_detail,
            previous_detail: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn base_values<'a>(
        &self,
        instance: &'a str,
        group: &'a str,
        dep: &'a Dependency,
        endpoint: &'a Endpoint,
    ) -> Vec<String> {
        let merged = dep.merged_labels(endpoint);
        let mut values = vec![
            instance.to_string(),
            group.to_string(),
            dep.name.clone(),
            dep.kind.as_str().to_string(),
            endpoint.host.clone(),
            endpoint.port.to_string(),
            if dep.critical { "yes".to_string() } else { "no".to_string() },
        ];
        for key in &self.custom_labels {
            values.push(merged.get(key).cloned().unwrap_or_default());
        }
        values
    }

    pub fn observe_latency(&self, instance: &str, group: &str, dep: &Dependency, endpoint: &Endpoint, seconds: f64) {
        let values = self.base_values(instance, group, dep, endpoint);
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        self.latency.with_label_values(&refs).observe(seconds);
    }

    /// `set_health` is only ever called after a threshold crossing; the caller decides when.
    pub fn set_health(&self, instance: &str, group: &str, dep: &Dependency, endpoint: &Endpoint, healthy: bool) {
        let values = self.base_values(instance, group, dep, endpoint);
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        self.health.with_label_values(&refs).set(if healthy { 1.0 } else { 0.0 });
    }

    /// Sets exactly one of the eight category series to 1, the rest to 0.
    pub fn set_status(&self, instance: &str, group: &str, dep: &Dependency, endpoint: &Endpoint, category: StatusCategory) {
        let mut values = self.base_values(instance, group, dep, endpoint);
        for cat in StatusCategory::ALL {
            values.push(cat.as_str().to_string());
            let refs: Vec<&str> = values.iter().map(String::as_str).collect();
            self.status.with_label_values(&refs).set(if cat == category { 1.0 } else { 0.0 });
            values.pop();
        }
    }

    /// Deletes the previous `detail` series (if any) before setting the new one.
    pub fn set_status_detail(&self, key: &EndpointKey, instance: &str, group: &str, dep: &Dependency, endpoint: &Endpoint, detail: &str) {
        let mut values = self.base_values(instance, group, dep, endpoint);
        let mut guard = self.previous_detail.lock().expect("previous_detail mutex poisoned");

        if let Some(prev) = guard.get(key) {
            if prev != detail {
                values.push(prev.clone());
                let refs: Vec<&str> = values.iter().map(String::as_str).collect();
                let _ = self.status_detail.remove_label_values(&refs);
                values.pop();
            } else {
                // Unchanged: re-set to 1 (idempotent) and return without touching the map.
                values.push(detail.to_string());
                let refs: Vec<&str> = values.iter().map(String::as_str).collect();
                self.status_detail.with_label_values(&refs).set(1.0);
                return;
            }
        }

        values.push(detail.to_string());
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        self.status_detail.with_label_values(&refs).set(1.0);
        guard.insert(key.clone(), detail.to_string());
    }

    /// Removes every series for this endpoint: health, latency, all eight status
    /// series, and the single live detail series.
    pub fn remove_endpoint(&self, key: &EndpointKey, instance: &str, group: &str, dep: &Dependency, endpoint: &Endpoint) {
        let values = self.base_values(instance, group, dep, endpoint);
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        let _ = self.health.remove_label_values(&refs);
        let _ = self.latency.remove_label_values(&refs);

        let mut status_values = values.clone();
        for cat in StatusCategory::ALL {
            status_values.push(cat.as_str().to_string());
            let refs: Vec<&str> = status_values.iter().map(String::as_str).collect();
            let _ = self.status.remove_label_values(&refs);
            status_values.pop();
        }

        let mut guard = self.previous_detail.lock().expect("previous_detail mutex poisoned");
        if let Some(prev) = guard.remove(key) {
            let mut detail_values = values;
            detail_values.push(prev);
            let refs: Vec<&str> = detail_values.iter().map(String::as_str).collect();
            let _ = self.status_detail.remove_label_values(&refs);
        }
    }
}
