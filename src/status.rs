//! Read-only snapshot of an endpoint's last classified outcome, surfaced as JSON.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::DependencyType;

/// The 11-field snapshot returned by `health_details()`, keyed by `"name:host:port"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointStatus {
    /// Tri-state: `None` before the first threshold crossing.
    pub healthy: Option<bool>,
    pub status: String,
    pub detail: String,
    pub latency_ms: f64,
    #[serde(rename = "type")]
    pub kind: DependencyType,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub critical: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub labels: BTreeMap<String, String>,
}

impl EndpointStatus {
    pub fn latency_millis(duration: Duration) -> f64 {
        duration.as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_health_serializes_to_null() {
        let status = EndpointStatus {
            healthy: None,
            status: "unknown".into(),
            detail: "unknown".into(),
            latency_ms: 0.0,
            kind: DependencyType::Tcp,
            name: "svc".into(),
            host: "h".into(),
            port: 1,
            critical: false,
            last_checked_at: None,
            labels: BTreeMap::new(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert!(json["healthy"].is_null());
        assert!(json["last_checked_at"].is_null());
    }

    #[test]
    fn latency_millis_converts_from_duration() {
        assert_eq!(EndpointStatus::latency_millis(Duration::from_millis(125)), 125.0);
    }
}
