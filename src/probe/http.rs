//! HTTP probe: `GET <scheme>://host:port<health_path>`, requiring a 2xx response.
//! 401/403 classify as `auth_error`; any other non-2xx as `unhealthy` with `http_<code>`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use isahc::config::{Configurable, RedirectPolicy};
use isahc::prelude::*;
use isahc::{HttpClient, Request};

use super::Probe;
use crate::error::{ProbeError, StatusCategory};
use crate::model::{DependencyType, Endpoint};

/// At most one of bearer/basic/custom-header auth may be configured; enforced at construction.
#[derive(Debug, Clone)]
pub enum HttpAuth {
    Bearer(String),
    Basic { username: String, password: String },
    Header { name: String, value: String },
}

#[derive(Debug, Clone)]
pub struct HttpProbeConfig {
    pub scheme: String,
    pub health_path: String,
    pub auth: Option<HttpAuth>,
    /// Enforced on the isahc client itself: `spawn_blocking` cannot be cancelled by the
    /// scheduler's outer `tokio::time::timeout`, so a hung connect would otherwise leak the
    /// blocking-pool thread past `stop()`. Should match the dependency's `CheckConfig::timeout`.
    pub timeout: Duration,
}

impl Default for HttpProbeConfig {
    fn default() -> Self {
        HttpProbeConfig {
            scheme: "http".to_string(),
            health_path: "/health".to_string(),
            auth: None,
            timeout: Duration::from_secs(5),
        }
    }
}

impl HttpProbeConfig {
    /// Accepts at most one auth option; any combination of two or more is a config error.
    pub fn with_auth_options(
        mut self,
        bearer: Option<String>,
        basic: Option<(String, String)>,
        header: Option<(String, String)>,
    ) -> Result<Self, crate::error::ConfigError> {
        let provided = [bearer.is_some(), basic.is_some(), header.is_some()].iter().filter(|b| **b).count();
        if provided > 1 {
            return Err(crate::error::ConfigError::ConflictingAuth(
                "at most one of bearer/basic/header auth may be configured".to_string(),
            ));
        }
        self.auth = bearer
            .map(HttpAuth::Bearer)
            .or_else(|| basic.map(|(username, password)| HttpAuth::Basic { username, password }))
            .or_else(|| header.map(|(name, value)| HttpAuth::Header { name, value }));
        Ok(self)
    }
}

/// Borrowed capability for pool-mode: the caller owns an existing client and lends it for
/// the duration of one probe call without the probe ever closing it.
#[async_trait]
pub trait HttpExecute: Send + Sync {
    async fn execute(&self) -> Result<(), ProbeError>;
}

struct StandaloneHttp {
    client: HttpClient,
    config: HttpProbeConfig,
}

impl StandaloneHttp {
    fn build_request(&self, endpoint: &Endpoint) -> Result<Request<()>, ProbeError> {
        let url = format!(
            "{}://{}:{}{}",
            self.config.scheme, endpoint.host, endpoint.port, self.config.health_path
        );
        let mut builder = Request::get(url);
        if let Some(auth) = &self.config.auth {
            builder = match auth {
                HttpAuth::Bearer(token) => builder.header("authorization", format!("Bearer {token}")),
                HttpAuth::Basic { username, password } => {
                    let token = BASE64.encode(format!("{username}:{password}").as_bytes());
                    builder.header("authorization", format!("Basic {token}"))
                }
                HttpAuth::Header { name, value } => builder.header(name, value),
            };
        }
        builder
            .body(())
            .map_err(|_| ProbeError::Check(StatusCategory::Error, "error".to_string()))
    }
}

pub enum HttpProbe {
    Standalone(StandaloneHttp),
    Pool(Arc<dyn HttpExecute>),
}

impl HttpProbe {
    pub fn standalone(config: HttpProbeConfig) -> Result<Self, crate::error::ConfigError> {
        let client = HttpClient::builder()
            .redirect_policy(RedirectPolicy::Limit(3))
            .timeout(config.timeout)
            .build()
            .map_err(|e| crate::error::ConfigError::InvalidConfigRange(format!("failed to build http client: {e}")))?;
        Ok(HttpProbe::Standalone(StandaloneHttp { client, config }))
    }

    pub fn pool(capability: Arc<dyn HttpExecute>) -> Self {
        HttpProbe::Pool(capability)
    }

    #[cfg(test)]
    fn build_request(&self, endpoint: &Endpoint) -> Result<Request<()>, ProbeError> {
        match self {
            HttpProbe::Standalone(inner) => inner.build_request(endpoint),
            HttpProbe::Pool(_) => unreachable!("pool-mode probes don't build requests"),
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self, endpoint: &Endpoint) -> Result<(), ProbeError> {
        match self {
            HttpProbe::Pool(capability) => capability.execute().await,
            HttpProbe::Standalone(inner) => {
                let request = inner.build_request(endpoint)?;
                let client = inner.client.clone();
                let response = tokio::task::spawn_blocking(move || client.send(request))
                    .await
                    .map_err(|_| ProbeError::Check(StatusCategory::Error, "error".to_string()))?
                    .map_err(|e| classify_isahc_error(&e))?;

                let status = response.status().as_u16();
                if (200..300).contains(&status) {
                    Ok(())
                } else if status == 401 || status == 403 {
                    Err(ProbeError::Auth)
                } else {
                    Err(ProbeError::Unhealthy(format!("http_{status}")))
                }
            }
        }
    }

    fn kind(&self) -> DependencyType {
        DependencyType::Http
    }
}

fn classify_isahc_error(err: &isahc::Error) -> ProbeError {
    use isahc::error::ErrorKind as IsahcErrorKind;
    match err.kind() {
        IsahcErrorKind::ConnectionFailed => ProbeError::ConnectionRefused,
        IsahcErrorKind::NameResolution => ProbeError::Dns,
        IsahcErrorKind::Timeout => ProbeError::Timeout,
        IsahcErrorKind::Tls => ProbeError::Tls,
        _ => ProbeError::Check(StatusCategory::Error, "error".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_conflicting_auth_at_construction() {
        let result = HttpProbeConfig::default().with_auth_options(
            Some("token".into()),
            Some(("u".into(), "p".into())),
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn basic_auth_encodes_credentials() {
        let config = HttpProbeConfig {
            auth: Some(HttpAuth::Basic { username: "u".into(), password: "p".into() }),
            ..Default::default()
        };
        let probe = HttpProbe::standalone(config).unwrap();
        let endpoint = Endpoint::new("h", 80);
        let request = probe.build_request(&endpoint).unwrap();
        let header = request.headers().get("authorization").unwrap().to_str().unwrap();
        assert!(header.starts_with("Basic "));
    }
}
