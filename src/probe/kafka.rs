//! Kafka probe: bootstrap a metadata request, requiring a non-empty broker set.

use std::sync::Arc;

use async_trait::async_trait;
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};

use super::Probe;
use crate::error::ProbeError;
use crate::model::{DependencyType, Endpoint};

#[derive(Clone, Default)]
pub struct KafkaProbeConfig {
    pub security_protocol: Option<String>,
}

/// Borrowed capability for pool-mode: the caller owns an existing client and lends it for
/// the duration of one probe call without the probe ever closing it.
#[async_trait]
pub trait KafkaExecute: Send + Sync {
    async fn execute(&self) -> Result<(), ProbeError>;
}

pub enum KafkaProbe {
    Standalone(KafkaProbeConfig),
    Pool(Arc<dyn KafkaExecute>),
}

impl KafkaProbe {
    pub fn standalone(config: KafkaProbeConfig) -> Self {
        KafkaProbe::Standalone(config)
    }

    pub fn pool(capability: Arc<dyn KafkaExecute>) -> Self {
        KafkaProbe::Pool(capability)
    }
}

#[async_trait]
impl Probe for KafkaProbe {
    async fn check(&self, endpoint: &Endpoint) -> Result<(), ProbeError> {
        let config = match self {
            KafkaProbe::Pool(capability) => return capability.execute().await,
            KafkaProbe::Standalone(config) => config,
        };

        let bootstrap = format!("{}:{}", endpoint.host, endpoint.port);
        let mut client_config = ClientConfig::new();
        client_config.set("bootstrap.servers", &bootstrap);
        if let Some(protocol) = &config.security_protocol {
            client_config.set("security.protocol", protocol);
        }

        let consumer: BaseConsumer<DefaultClientContext> =
            client_config.create().map_err(|_| ProbeError::ConnectionRefused)?;

        let metadata = tokio::task::spawn_blocking(move || {
            consumer.fetch_metadata(None, std::time::Duration::from_secs(5))
        })
        .await
        .map_err(|_| ProbeError::Check(crate::error::StatusCategory::Error, "error".to_string()))?
        .map_err(|_| ProbeError::ConnectionRefused)?;

        if metadata.brokers().is_empty() {
            return Err(ProbeError::Unhealthy("no_brokers".to_string()));
        }
        Ok(())
    }

    fn kind(&self) -> DependencyType {
        DependencyType::Kafka
    }
}
