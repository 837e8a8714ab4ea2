//! LDAP probe: one of {anonymous bind, simple bind, Root DSE read, search with filter}.
//! StartTLS and LDAPS are both supported; combining them is rejected at construction.

use std::sync::Arc;

use async_trait::async_trait;
use ldap3::{LdapConnAsync, Scope, SearchEntry};

use super::Probe;
use crate::error::{ConfigError, ProbeError};
use crate::model::{DependencyType, Endpoint};

/// Borrowed capability for pool-mode: the caller owns an existing connection and lends it
/// for the duration of one probe call without the probe ever closing it.
#[async_trait]
pub trait LdapExecute: Send + Sync {
    async fn execute(&self) -> Result<(), ProbeError>;
}

#[derive(Clone)]
pub enum LdapMode {
    AnonymousBind,
    SimpleBind { bind_dn: String, password: String },
    RootDse,
    Search { base_dn: String, filter: String },
}

/// `StartTls` and `Ldaps` are mutually exclusive: StartTLS negotiates TLS over a
/// plaintext `ldap://` connection, while `ldaps://` is already a TLS connection.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    None,
    StartTls,
    Ldaps,
}

#[derive(Clone)]
pub struct LdapProbeConfig {
    pub mode: LdapMode,
    pub tls: TlsMode,
}

impl TlsMode {
    /// Combines the two independent flags a caller typically configures, rejecting
    /// the invalid combination at construction rather than silently picking one.
    pub fn from_flags(use_ldaps: bool, use_starttls: bool) -> Result<Self, ConfigError> {
        match (use_ldaps, use_starttls) {
            (true, true) => Err(ConfigError::ConflictingTlsMode("ldaps cannot be combined with starttls".to_string())),
            (true, false) => Ok(TlsMode::Ldaps),
            (false, true) => Ok(TlsMode::StartTls),
            (false, false) => Ok(TlsMode::None),
        }
    }
}

impl LdapProbeConfig {
    pub fn new(mode: LdapMode, tls: TlsMode) -> Result<Self, ConfigError> {
        if let LdapMode::SimpleBind { bind_dn, password } = &mode {
            if bind_dn.is_empty() || password.is_empty() {
                return Err(ConfigError::MissingCredentials(
                    "simple bind requires both bind_dn and password".to_string(),
                ));
            }
        }
        if let LdapMode::Search { base_dn, .. } = &mode {
            if base_dn.is_empty() {
                return Err(ConfigError::InvalidConfigRange("search mode requires a non-empty base_dn".to_string()));
            }
        }
        Ok(LdapProbeConfig { mode, tls })
    }
}

pub enum LdapProbe {
    Standalone(LdapProbeConfig),
    Pool(Arc<dyn LdapExecute>),
}

impl LdapProbe {
    pub fn standalone(config: LdapProbeConfig) -> Self {
        LdapProbe::Standalone(config)
    }

    pub fn pool(capability: Arc<dyn LdapExecute>) -> Self {
        LdapProbe::Pool(capability)
    }
}

#[async_trait]
impl Probe for LdapProbe {
    async fn check(&self, endpoint: &Endpoint) -> Result<(), ProbeError> {
        let config = match self {
            LdapProbe::Pool(capability) => return capability.execute().await,
            LdapProbe::Standalone(config) => config,
        };

        let scheme = if config.tls == TlsMode::Ldaps { "ldaps" } else { "ldap" };
        let url = format!("{}://{}:{}", scheme, endpoint.host, endpoint.port);

        let (conn, mut ldap) = LdapConnAsync::new(&url).await.map_err(classify_ldap_error)?;
        ldap3::drive!(conn);

        if config.tls == TlsMode::StartTls {
            ldap.start_tls().await.map_err(|_| ProbeError::Tls)?;
        }

        match &config.mode {
            LdapMode::AnonymousBind => {
                ldap.simple_bind("", "").await.map_err(classify_ldap_error)?.success().map_err(classify_ldap_error)?;
            }
            LdapMode::SimpleBind { bind_dn, password } => {
                ldap.simple_bind(bind_dn, password)
                    .await
                    .map_err(classify_ldap_error)?
                    .success()
                    .map_err(classify_ldap_error)?;
            }
            LdapMode::RootDse => {
                let (results, _res) = ldap
                    .search("", Scope::Base, "(objectClass=*)", vec!["*"])
                    .await
                    .map_err(classify_ldap_error)?
                    .success()
                    .map_err(classify_ldap_error)?;
                if results.is_empty() {
                    return Err(ProbeError::Unhealthy("empty_root_dse".to_string()));
                }
            }
            LdapMode::Search { base_dn, filter } => {
                let (results, _res) = ldap
                    .search(base_dn, Scope::Subtree, filter, vec!["dn"])
                    .await
                    .map_err(classify_ldap_error)?
                    .success()
                    .map_err(classify_ldap_error)?;
                let _: Vec<SearchEntry> = results.into_iter().map(SearchEntry::construct).collect();
            }
        }

        let _ = ldap.unbind().await;
        Ok(())
    }

    fn kind(&self) -> DependencyType {
        DependencyType::Ldap
    }
}

fn classify_ldap_error(err: ldap3::LdapError) -> ProbeError {
    let message = err.to_string();
    if message.contains("invalidCredentials") || message.contains("insufficientAccessRights") {
        ProbeError::Auth
    } else if message.contains("busy") || message.contains("unavailable") || message.contains("unwillingToPerform") {
        ProbeError::Unhealthy("ldap_unavailable".to_string())
    } else {
        ProbeError::Check(crate::error::StatusCategory::Error, "error".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_bind_without_credentials_is_rejected() {
        let result = LdapProbeConfig::new(
            LdapMode::SimpleBind { bind_dn: String::new(), password: String::new() },
            TlsMode::None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn ldaps_combined_with_starttls_is_rejected() {
        assert!(TlsMode::from_flags(true, true).is_err());
    }

    #[test]
    fn search_without_base_dn_is_rejected() {
        let result = LdapProbeConfig::new(
            LdapMode::Search { base_dn: String::new(), filter: "(objectClass=*)".to_string() },
            TlsMode::None,
        );
        assert!(result.is_err());
    }
}
