//! MySQL probe: `SELECT 1`, standalone or pooled.

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder};

use super::Probe;
use crate::error::ProbeError;
use crate::model::{DependencyType, Endpoint};

#[async_trait]
pub trait MysqlPing: Send + Sync {
    async fn ping(&self) -> Result<(), ProbeError>;
}

#[derive(Clone)]
pub struct MysqlProbeConfig {
    pub user: String,
    pub password: Option<String>,
    pub dbname: Option<String>,
    pub query: String,
}

impl Default for MysqlProbeConfig {
    fn default() -> Self {
        MysqlProbeConfig { user: "root".to_string(), password: None, dbname: None, query: "SELECT 1".to_string() }
    }
}

pub enum MysqlProbe {
    Standalone(MysqlProbeConfig),
    Pool(std::sync::Arc<dyn MysqlPing>),
}

impl MysqlProbe {
    pub fn standalone(config: MysqlProbeConfig) -> Self {
        MysqlProbe::Standalone(config)
    }

    pub fn pool(capability: std::sync::Arc<dyn MysqlPing>) -> Self {
        MysqlProbe::Pool(capability)
    }
}

#[async_trait]
impl Probe for MysqlProbe {
    async fn check(&self, endpoint: &Endpoint) -> Result<(), ProbeError> {
        match self {
            MysqlProbe::Pool(capability) => capability.ping().await,
            MysqlProbe::Standalone(config) => {
                let mut builder = OptsBuilder::default()
                    .ip_or_hostname(endpoint.host.clone())
                    .tcp_port(endpoint.port)
                    .user(Some(config.user.clone()));
                if let Some(password) = &config.password {
                    builder = builder.pass(Some(password.clone()));
                }
                if let Some(dbname) = &config.dbname {
                    builder = builder.db_name(Some(dbname.clone()));
                }

                let opts = Opts::from(builder);
                let mut conn = Conn::new(opts).await.map_err(classify_mysql_error)?;
                conn.query_drop(&config.query).await.map_err(classify_mysql_error)?;
                conn.disconnect().await.map_err(classify_mysql_error)
            }
        }
    }

    fn kind(&self) -> DependencyType {
        DependencyType::Mysql
    }
}

fn classify_mysql_error(err: mysql_async::Error) -> ProbeError {
    use mysql_async::Error;
    match err {
        Error::Server(server_err) if server_err.code == 1045 || server_err.code == 1044 => ProbeError::Auth,
        Error::Io(_) => ProbeError::ConnectionRefused,
        _ => ProbeError::Check(crate::error::StatusCategory::Error, "error".to_string()),
    }
}
