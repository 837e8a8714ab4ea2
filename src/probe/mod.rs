//! Uniform probe contract. Each protocol implements `check`; the scheduler applies
//! the deadline via `tokio::time::timeout` — probes never enforce their own timeout.

use async_trait::async_trait;

use crate::error::ProbeError;
use crate::model::{DependencyType, Endpoint};

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "grpc")]
pub mod grpc;
pub mod tcp;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "redis")]
pub mod redis;
#[cfg(feature = "amqp")]
pub mod amqp;
#[cfg(feature = "kafka")]
pub mod kafka;
#[cfg(feature = "ldap")]
pub mod ldap;

/// A probe asserts one protocol-specific thing against one endpoint. Probes are not
/// responsible for timing themselves out; the caller wraps `check` in a deadline.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self, endpoint: &Endpoint) -> Result<(), ProbeError>;
    fn kind(&self) -> DependencyType;
}

/// Whether a probe owns its underlying client (`Standalone`) or borrows a caller-supplied
/// connection/pool that it must never close (`Pool`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionMode {
    Standalone,
    Pool,
}
