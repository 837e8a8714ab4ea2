//! gRPC probe: `grpc.health.v1.Health/Check(service)`, requiring `SERVING`.

use std::sync::Arc;

use async_trait::async_trait;
use tonic::transport::Channel;
use tonic::Code;

use super::Probe;
use crate::error::{ProbeError, StatusCategory};
use crate::model::{DependencyType, Endpoint};

pub mod health_v1 {
    tonic::include_proto!("grpc.health.v1");
}

use health_v1::health_client::HealthClient;
use health_v1::HealthCheckRequest;

#[derive(Debug, Clone)]
pub enum GrpcAuth {
    Bearer(String),
    Metadata { key: String, value: String },
}

#[derive(Debug, Clone, Default)]
pub struct GrpcProbeConfig {
    pub service: String,
    pub auth: Option<GrpcAuth>,
    pub use_tls: bool,
}

impl GrpcProbeConfig {
    pub fn with_auth_options(
        mut self,
        bearer: Option<String>,
        metadata: Option<(String, String)>,
    ) -> Result<Self, crate::error::ConfigError> {
        if bearer.is_some() && metadata.is_some() {
            return Err(crate::error::ConfigError::ConflictingAuth(
                "at most one of bearer/metadata auth may be configured for grpc".to_string(),
            ));
        }
        self.auth = bearer
            .map(GrpcAuth::Bearer)
            .or_else(|| metadata.map(|(key, value)| GrpcAuth::Metadata { key, value }));
        Ok(self)
    }
}

/// Borrowed capability for pool-mode: the caller owns an existing channel/client and lends
/// it for the duration of one probe call without the probe ever closing it.
#[async_trait]
pub trait GrpcExecute: Send + Sync {
    async fn execute(&self) -> Result<(), ProbeError>;
}

pub enum GrpcProbe {
    Standalone(GrpcProbeConfig),
    Pool(Arc<dyn GrpcExecute>),
}

impl GrpcProbe {
    pub fn standalone(config: GrpcProbeConfig) -> Self {
        GrpcProbe::Standalone(config)
    }

    pub fn pool(capability: Arc<dyn GrpcExecute>) -> Self {
        GrpcProbe::Pool(capability)
    }
}

#[async_trait]
impl Probe for GrpcProbe {
    async fn check(&self, endpoint: &Endpoint) -> Result<(), ProbeError> {
        let config = match self {
            GrpcProbe::Pool(capability) => return capability.execute().await,
            GrpcProbe::Standalone(config) => config,
        };

        let scheme = if config.use_tls { "https" } else { "http" };
        let uri = format!("{}://{}:{}", scheme, endpoint.host, endpoint.port);

        let channel = Channel::from_shared(uri)
            .map_err(|_| ProbeError::Check(StatusCategory::Error, "error".to_string()))?
            .connect()
            .await
            .map_err(|_| ProbeError::ConnectionRefused)?;

        let mut client = HealthClient::new(channel);
        let mut request = tonic::Request::new(HealthCheckRequest { service: config.service.clone() });
        match &config.auth {
            Some(GrpcAuth::Bearer(token)) => {
                let value = format!("Bearer {token}")
                    .parse()
                    .map_err(|_| ProbeError::Check(StatusCategory::Error, "error".to_string()))?;
                request.metadata_mut().insert("authorization", value);
            }
            Some(GrpcAuth::Metadata { key, value }) => {
                let parsed_value = value
                    .parse()
                    .map_err(|_| ProbeError::Check(StatusCategory::Error, "error".to_string()))?;
                let parsed_key: tonic::metadata::MetadataKey<_> = key
                    .parse()
                    .map_err(|_| ProbeError::Check(StatusCategory::Error, "error".to_string()))?;
                request.metadata_mut().insert(parsed_key, parsed_value);
            }
            None => {}
        }

        let response = client.check(request).await.map_err(|status| classify_grpc_status(&status))?;

        match response.into_inner().status() {
            health_v1::health_check_response::ServingStatus::Serving => Ok(()),
            health_v1::health_check_response::ServingStatus::Unknown => {
                Err(ProbeError::Unhealthy("grpc_unknown".to_string()))
            }
            _ => Err(ProbeError::Unhealthy("grpc_not_serving".to_string())),
        }
    }

    fn kind(&self) -> DependencyType {
        DependencyType::Grpc
    }
}

fn classify_grpc_status(status: &tonic::Status) -> ProbeError {
    match status.code() {
        Code::Unauthenticated | Code::PermissionDenied => ProbeError::Auth,
        Code::Unavailable => ProbeError::ConnectionRefused,
        Code::DeadlineExceeded => ProbeError::Timeout,
        _ => ProbeError::Check(StatusCategory::Error, "error".to_string()),
    }
}
