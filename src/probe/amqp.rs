//! AMQP probe: open a broker connection and cleanly close it.

use std::sync::Arc;

use async_trait::async_trait;
use lapin::{Connection, ConnectionProperties};

use super::Probe;
use crate::error::ProbeError;
use crate::model::{DependencyType, Endpoint};

#[derive(Clone, Default)]
pub struct AmqpProbeConfig {
    pub user: Option<String>,
    pub password: Option<String>,
    pub vhost: String,
}

/// Borrowed capability for pool-mode: the caller owns an existing broker connection and
/// lends it for the duration of one probe call without the probe ever closing it.
#[async_trait]
pub trait AmqpExecute: Send + Sync {
    async fn execute(&self) -> Result<(), ProbeError>;
}

pub enum AmqpProbe {
    Standalone(AmqpProbeConfig),
    Pool(Arc<dyn AmqpExecute>),
}

impl AmqpProbe {
    pub fn standalone(config: AmqpProbeConfig) -> Self {
        AmqpProbe::Standalone(config)
    }

    pub fn pool(capability: Arc<dyn AmqpExecute>) -> Self {
        AmqpProbe::Pool(capability)
    }
}

#[async_trait]
impl Probe for AmqpProbe {
    async fn check(&self, endpoint: &Endpoint) -> Result<(), ProbeError> {
        let config = match self {
            AmqpProbe::Pool(capability) => return capability.execute().await,
            AmqpProbe::Standalone(config) => config,
        };

        let credentials = match (&config.user, &config.password) {
            (Some(user), Some(password)) => format!("{user}:{password}@"),
            _ => String::new(),
        };
        let vhost = if config.vhost.is_empty() { String::new() } else { format!("/{}", config.vhost) };
        let uri = format!("amqp://{}{}:{}{}", credentials, endpoint.host, endpoint.port, vhost);

        let connection = Connection::connect(&uri, ConnectionProperties::default())
            .await
            .map_err(classify_amqp_error)?;
        connection.close(200, "health check complete").await.map_err(classify_amqp_error)
    }

    fn kind(&self) -> DependencyType {
        DependencyType::Amqp
    }
}

fn classify_amqp_error(err: lapin::Error) -> ProbeError {
    let message = err.to_string();
    if message.contains("ACCESS_REFUSED") || message.contains("403") {
        ProbeError::Auth
    } else if message.contains("refused") || message.contains("Refused") {
        ProbeError::ConnectionRefused
    } else {
        ProbeError::Check(crate::error::StatusCategory::Error, "error".to_string())
    }
}
