//! Redis probe: `PING`, accepting only the affirmative `PONG` response.

use async_trait::async_trait;
use redis::AsyncCommands;

use super::Probe;
use crate::error::ProbeError;
use crate::model::{DependencyType, Endpoint};

#[async_trait]
pub trait RedisPing: Send + Sync {
    async fn ping(&self) -> Result<(), ProbeError>;
}

#[derive(Clone, Default)]
pub struct RedisProbeConfig {
    pub password: Option<String>,
    pub use_tls: bool,
}

pub enum RedisProbe {
    Standalone(RedisProbeConfig),
    Pool(std::sync::Arc<dyn RedisPing>),
}

impl RedisProbe {
    pub fn standalone(config: RedisProbeConfig) -> Self {
        RedisProbe::Standalone(config)
    }

    pub fn pool(capability: std::sync::Arc<dyn RedisPing>) -> Self {
        RedisProbe::Pool(capability)
    }
}

#[async_trait]
impl Probe for RedisProbe {
    async fn check(&self, endpoint: &Endpoint) -> Result<(), ProbeError> {
        match self {
            RedisProbe::Pool(capability) => capability.ping().await,
            RedisProbe::Standalone(config) => {
                let scheme = if config.use_tls { "rediss" } else { "redis" };
                let url = format!("{}://{}:{}", scheme, endpoint.host, endpoint.port);
                let client = redis::Client::open(url.as_str())
                    .map_err(|_| ProbeError::Check(crate::error::StatusCategory::Error, "error".to_string()))?;
                let mut conn = client.get_multiplexed_async_connection().await.map_err(classify_redis_error)?;

                if let Some(password) = &config.password {
                    let _: () = redis::cmd("AUTH")
                        .arg(password)
                        .query_async(&mut conn)
                        .await
                        .map_err(classify_redis_error)?;
                }

                let response: String = conn.ping().await.map_err(classify_redis_error)?;
                if response == "PONG" {
                    Ok(())
                } else {
                    Err(ProbeError::Unhealthy("unexpected_ping_response".to_string()))
                }
            }
        }
    }

    fn kind(&self) -> DependencyType {
        DependencyType::Redis
    }
}

fn classify_redis_error(err: redis::RedisError) -> ProbeError {
    use redis::ErrorKind;
    match err.kind() {
        ErrorKind::AuthenticationFailed => ProbeError::Auth,
        ErrorKind::IoError => ProbeError::ConnectionRefused,
        _ => {
            let message = err.to_string();
            if message.contains("NOAUTH") || message.contains("WRONGPASS") || message.contains("AUTH") {
                ProbeError::Auth
            } else {
                ProbeError::Check(crate::error::StatusCategory::Error, "error".to_string())
            }
        }
    }
}
