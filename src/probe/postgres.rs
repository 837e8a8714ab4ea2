//! Postgres probe: `SELECT 1` (or a configured probe query), standalone or pooled.

use async_trait::async_trait;
use tokio_postgres::{Config, NoTls};

use super::Probe;
use crate::error::ProbeError;
use crate::model::{DependencyType, Endpoint};

/// Borrowed capability for pool-mode: the caller owns the pool and lends a connection
/// for the duration of one probe call without the probe ever closing it.
#[async_trait]
pub trait PostgresPing: Send + Sync {
    async fn ping(&self) -> Result<(), ProbeError>;
}

#[derive(Clone)]
pub struct PostgresProbeConfig {
    pub user: String,
    pub password: Option<String>,
    pub dbname: String,
    pub query: String,
}

impl Default for PostgresProbeConfig {
    fn default() -> Self {
        PostgresProbeConfig {
            user: "postgres".to_string(),
            password: None,
            dbname: "postgres".to_string(),
            query: "SELECT 1".to_string(),
        }
    }
}

pub enum PostgresProbe {
    Standalone(PostgresProbeConfig),
    Pool(std::sync::Arc<dyn PostgresPing>),
}

impl PostgresProbe {
    pub fn standalone(config: PostgresProbeConfig) -> Self {
        PostgresProbe::Standalone(config)
    }

    pub fn pool(capability: std::sync::Arc<dyn PostgresPing>) -> Self {
        PostgresProbe::Pool(capability)
    }
}

#[async_trait]
impl Probe for PostgresProbe {
    async fn check(&self, endpoint: &Endpoint) -> Result<(), ProbeError> {
        match self {
            PostgresProbe::Pool(capability) => capability.ping().await,
            PostgresProbe::Standalone(config) => {
                let mut pg_config = Config::new();
                pg_config
                    .host(&endpoint.host)
                    .port(endpoint.port)
                    .user(&config.user)
                    .dbname(&config.dbname);
                if let Some(password) = &config.password {
                    pg_config.password(password);
                }

                let (client, connection) = pg_config.connect(NoTls).await.map_err(classify_pg_error)?;
                let handle = tokio::spawn(async move {
                    let _ = connection.await;
                });

                let result = client.simple_query(&config.query).await.map(|_| ()).map_err(classify_pg_error);
                handle.abort();
                result
            }
        }
    }

    fn kind(&self) -> DependencyType {
        DependencyType::Postgres
    }
}

fn classify_pg_error(err: tokio_postgres::Error) -> ProbeError {
    if let Some(db_err) = err.as_db_error() {
        if db_err.code() == &tokio_postgres::error::SqlState::INVALID_PASSWORD
            || db_err.code() == &tokio_postgres::error::SqlState::INVALID_AUTHORIZATION_SPECIFICATION
        {
            return ProbeError::Auth;
        }
    }
    if err.is_closed() {
        return ProbeError::ConnectionRefused;
    }
    ProbeError::Check(crate::error::StatusCategory::Error, "error".to_string())
}
