//! Dependency/endpoint data model: names, labels, reserved identifiers, config ranges.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Labels that the exporter reserves for the base tuple; custom labels may not collide.
pub const RESERVED_LABELS: &[&str] = &["name", "group", "dependency", "type", "host", "port", "critical"];

fn custom_label_re() -> Regex {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex")
}

fn identity_re() -> Regex {
    Regex::new(r"^[a-z][a-z0-9-]{0,62}$").expect("static regex")
}

fn dependency_name_re() -> Regex {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_-]{0,62}$").expect("static regex")
}

/// Closed enumeration of protocol kinds a dependency may be checked over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    Http,
    Grpc,
    Tcp,
    Postgres,
    Mysql,
    Redis,
    Amqp,
    Kafka,
    Ldap,
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyType::Http => "http",
            DependencyType::Grpc => "grpc",
            DependencyType::Tcp => "tcp",
            DependencyType::Postgres => "postgres",
            DependencyType::Mysql => "mysql",
            DependencyType::Redis => "redis",
            DependencyType::Amqp => "amqp",
            DependencyType::Kafka => "kafka",
            DependencyType::Ldap => "ldap",
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One network target of a dependency. The unit of scheduling and of metric cardinality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint { host: host.into(), port, labels: BTreeMap::new() }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn key(&self, dependency: &str) -> EndpointKey {
        EndpointKey { dependency: dependency.to_string(), host: self.host.clone(), port: self.port }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::InvalidName("endpoint host must not be empty".into()));
        }
        for key in self.labels.keys() {
            validate_custom_label(key)?;
        }
        Ok(())
    }
}

/// Identity key for a scheduled endpoint: `(dependency, host, port)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EndpointKey {
    pub dependency: String,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.dependency, self.host, self.port)
    }
}

/// Per-dependency check policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub initial_delay: Duration,
    pub failure_threshold: u32,
    pub success_threshold: u32,
}

impl Default for CheckConfig {
    fn default() -> Self {
        CheckConfig {
            interval: Duration::from_secs(15),
            timeout: Duration::from_secs(5),
            initial_delay: Duration::from_secs(5),
            failure_threshold: 1,
            success_threshold: 1,
        }
    }
}

impl CheckConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let secs = |d: Duration| d.as_secs_f64();
        if !(1.0..=300.0).contains(&secs(self.interval)) {
            return Err(ConfigError::InvalidConfigRange("interval must be within [1s, 300s]".into()));
        }
        if !(1.0..=60.0).contains(&secs(self.timeout)) {
            return Err(ConfigError::InvalidConfigRange("timeout must be within [1s, 60s]".into()));
        }
        if secs(self.initial_delay) > 300.0 {
            return Err(ConfigError::InvalidConfigRange("initial_delay must be within [0s, 300s]".into()));
        }
        if !(1..=100).contains(&self.failure_threshold) {
            return Err(ConfigError::InvalidConfigRange("failure_threshold must be within [1, 100]".into()));
        }
        if !(1..=100).contains(&self.success_threshold) {
            return Err(ConfigError::InvalidConfigRange("success_threshold must be within [1, 100]".into()));
        }
        Ok(())
    }
}

/// Logical external component: a name, a protocol kind, and its endpoints.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub name: String,
    pub kind: DependencyType,
    pub critical: bool,
    pub endpoints: Vec<Endpoint>,
    pub config: CheckConfig,
    /// Labels common to all endpoints of this dependency (endpoint-level labels win on conflict).
    pub labels: BTreeMap<String, String>,
    /// Set once `.config()` is called explicitly, so the facade can tell "never set" apart
    /// from "set to a value that happens to equal the default" when applying builder-global
    /// interval/timeout overrides.
    pub(crate) config_overridden: bool,
}

impl Dependency {
    pub fn new(name: impl Into<String>, kind: DependencyType, endpoints: Vec<Endpoint>) -> Self {
        Dependency {
            name: name.into(),
            kind,
            critical: false,
            endpoints,
            config: CheckConfig::default(),
            labels: BTreeMap::new(),
            config_overridden: false,
        }
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn config(mut self, config: CheckConfig) -> Self {
        self.config = config;
        self.config_overridden = true;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Eager validation applied at admission, never at first check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !dependency_name_re().is_match(&self.name) {
            return Err(ConfigError::InvalidName(format!(
                "dependency name '{}' must match [A-Za-z][A-Za-z0-9_-]{{0,62}}",
                self.name
            )));
        }
        if self.endpoints.is_empty() {
            return Err(ConfigError::InvalidConfigRange(format!(
                "dependency '{}' has no endpoints",
                self.name
            )));
        }
        self.config.validate()?;
        for key in self.labels.keys() {
            validate_custom_label(key)?;
        }
        for endpoint in &self.endpoints {
            endpoint.validate()?;
        }
        Ok(())
    }

    /// Per-endpoint label view: dependency-level labels overlaid by endpoint-level labels.
    pub fn merged_labels(&self, endpoint: &Endpoint) -> BTreeMap<String, String> {
        let mut merged = self.labels.clone();
        merged.extend(endpoint.labels.clone());
        merged
    }
}

pub fn validate_custom_label(key: &str) -> Result<(), ConfigError> {
    if RESERVED_LABELS.contains(&key) {
        return Err(ConfigError::ReservedLabel(key.to_string()));
    }
    if !custom_label_re().is_match(key) {
        return Err(ConfigError::InvalidLabel(format!(
            "label '{}' must match [A-Za-z_][A-Za-z0-9_]*",
            key
        )));
    }
    Ok(())
}

/// Instance/group identifiers validated the same way as dependency names, but lowercase-only.
pub fn validate_identity(value: &str, field: &str) -> Result<(), ConfigError> {
    if !identity_re().is_match(value) {
        return Err(ConfigError::InvalidName(format!(
            "{} '{}' must match [a-z][a-z0-9-]{{0,62}}",
            field, value
        )));
    }
    Ok(())
}

pub fn validate_port(port: i64) -> Result<u16, ConfigError> {
    if port < 1 || port > 65535 {
        return Err(ConfigError::InvalidPort(port));
    }
    Ok(port as u16)
}
