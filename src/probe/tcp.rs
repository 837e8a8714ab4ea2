//! TCP probe: open a connection within the deadline, close immediately.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::Probe;
use crate::error::ProbeError;
use crate::model::{DependencyType, Endpoint};

/// Borrowed capability for pool-mode: the caller owns an existing socket/connection pool
/// and lends it for the duration of one probe call without the probe ever closing it.
#[async_trait]
pub trait TcpExecute: Send + Sync {
    async fn execute(&self) -> Result<(), ProbeError>;
}

pub enum TcpProbe {
    Standalone,
    Pool(Arc<dyn TcpExecute>),
}

impl TcpProbe {
    pub fn new() -> Self {
        TcpProbe::Standalone
    }

    pub fn pool(capability: Arc<dyn TcpExecute>) -> Self {
        TcpProbe::Pool(capability)
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        TcpProbe::new()
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn check(&self, endpoint: &Endpoint) -> Result<(), ProbeError> {
        match self {
            TcpProbe::Pool(capability) => capability.execute().await,
            TcpProbe::Standalone => {
                let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
                drop(stream);
                Ok(())
            }
        }
    }

    fn kind(&self) -> DependencyType {
        DependencyType::Tcp
    }
}
