//! Error planes: fatal config errors vs. recovered probe outcomes, and the closed status taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raised synchronously by the facade or scheduler admission. Fatal to the calling operation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid name: {0}")]
    InvalidName(String),
    #[error("invalid label: {0}")]
    InvalidLabel(String),
    #[error("reserved label: {0}")]
    ReservedLabel(String),
    #[error("invalid port: {0}")]
    InvalidPort(i64),
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("invalid config range: {0}")]
    InvalidConfigRange(String),
    #[error("conflicting auth configuration: {0}")]
    ConflictingAuth(String),
    #[error("conflicting TLS mode: {0}")]
    ConflictingTlsMode(String),
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    #[error("endpoint not found: {0}")]
    EndpointNotFound(String),
    #[error("scheduler is not running")]
    NotRunning,
    #[error("scheduler is already stopped")]
    AlreadyStopped,
}

/// The eight closed outcome categories, plus `unknown` which is used only before the first check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    Ok,
    Timeout,
    ConnectionError,
    DnsError,
    AuthError,
    TlsError,
    Unhealthy,
    Error,
}

impl StatusCategory {
    /// All eight in the fixed emission order used by the `app_dependency_status` family.
    pub const ALL: [StatusCategory; 8] = [
        StatusCategory::Ok,
        StatusCategory::Timeout,
        StatusCategory::ConnectionError,
        StatusCategory::DnsError,
        StatusCategory::AuthError,
        StatusCategory::TlsError,
        StatusCategory::Unhealthy,
        StatusCategory::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCategory::Ok => "ok",
            StatusCategory::Timeout => "timeout",
            StatusCategory::ConnectionError => "connection_error",
            StatusCategory::DnsError => "dns_error",
            StatusCategory::AuthError => "auth_error",
            StatusCategory::TlsError => "tls_error",
            StatusCategory::Unhealthy => "unhealthy",
            StatusCategory::Error => "error",
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed probe error carrying intrinsic category/detail so classification is deterministic.
#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("operation timed out")]
    Timeout,
    #[error("connection refused")]
    ConnectionRefused,
    #[error("dns resolution failed")]
    Dns,
    #[error("authentication failed")]
    Auth,
    #[error("tls/certificate error")]
    Tls,
    #[error("unhealthy: {0}")]
    Unhealthy(String),
    /// Untyped escape hatch for protocol-specific classification (e.g. `http_503`).
    #[error("{1}")]
    Check(StatusCategory, String),
    /// Any other I/O-level failure, classified by the platform-error fallback chain.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Elapsed(#[from] tokio::time::error::Elapsed),
}

/// Outcome of classifying a probe result: `(category, detail)`. `ok` on success.
pub fn classify(result: &Result<(), ProbeError>) -> (StatusCategory, String) {
    match result {
        Ok(()) => (StatusCategory::Ok, "ok".to_string()),
        Err(err) => classify_err(err),
    }
}

fn classify_err(err: &ProbeError) -> (StatusCategory, String) {
    match err {
        ProbeError::Timeout | ProbeError::Elapsed(_) => (StatusCategory::Timeout, "timeout".to_string()),
        ProbeError::ConnectionRefused => (StatusCategory::ConnectionError, "connection_refused".to_string()),
        ProbeError::Dns => (StatusCategory::DnsError, "dns_error".to_string()),
        ProbeError::Auth => (StatusCategory::AuthError, "auth_error".to_string()),
        ProbeError::Tls => (StatusCategory::TlsError, "tls_error".to_string()),
        ProbeError::Unhealthy(detail) => (StatusCategory::Unhealthy, detail.clone()),
        ProbeError::Check(cat, detail) => (*cat, detail.clone()),
        ProbeError::Io(io_err) => classify_io(io_err),
    }
}

fn classify_io(io_err: &std::io::Error) -> (StatusCategory, String) {
    use std::io::ErrorKind;
    match io_err.kind() {
        ErrorKind::ConnectionRefused => (StatusCategory::ConnectionError, "connection_refused".to_string()),
        ErrorKind::TimedOut => (StatusCategory::Timeout, "timeout".to_string()),
        _ => (StatusCategory::Error, "error".to_string()),
    }
}
