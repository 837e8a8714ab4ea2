//! URL/DSN parsing: connection strings, JDBC URLs, and libpq-style key=value strings
//! normalize to an ordered sequence of `(host, port, kind)` triples.

use crate::error::ConfigError;
use crate::model::DependencyType;

/// One resolved network target before it is wrapped into an `Endpoint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTarget {
    pub host: String,
    pub port: u16,
    pub kind: DependencyType,
}

fn scheme_kind(scheme: &str) -> Option<DependencyType> {
    match scheme {
        "postgres" | "postgresql" => Some(DependencyType::Postgres),
        "mysql" => Some(DependencyType::Mysql),
        "redis" | "rediss" => Some(DependencyType::Redis),
        "amqp" | "amqps" => Some(DependencyType::Amqp),
        "http" | "https" => Some(DependencyType::Http),
        "grpc" => Some(DependencyType::Grpc),
        "kafka" => Some(DependencyType::Kafka),
        "ldap" | "ldaps" => Some(DependencyType::Ldap),
        "tcp" => Some(DependencyType::Tcp),
        _ => None,
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "postgres" | "postgresql" => Some(5432),
        "mysql" => Some(3306),
        "redis" | "rediss" => Some(6379),
        "amqp" => Some(5672),
        "amqps" => Some(5671),
        "http" => Some(80),
        "https" => Some(443),
        "grpc" => Some(443),
        "kafka" => Some(9092),
        "ldap" => Some(389),
        "ldaps" => Some(636),
        _ => None,
    }
}

/// Parse a URL such as `postgres://h:5432/db` or the multi-host `kafka://b1:9092,b2:9092`.
pub fn parse_url(input: &str) -> Result<Vec<ParsedTarget>, ConfigError> {
    let (scheme, rest) = input
        .split_once("://")
        .ok_or_else(|| ConfigError::UnsupportedScheme(format!("missing scheme in '{}'", input)))?;
    let kind = scheme_kind(scheme)
        .ok_or_else(|| ConfigError::UnsupportedScheme(format!("unknown scheme '{}'", scheme)))?;
    let default = default_port(scheme);

    // Authority ends at the first '/', '?' or '#'.
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..authority_end];
    // Strip userinfo if present (user:pass@host...).
    let authority = authority.rsplit_once('@').map(|(_, h)| h).unwrap_or(authority);

    if authority.is_empty() {
        return Err(ConfigError::InvalidName("empty host in URL".into()));
    }

    let mut targets = Vec::new();
    for host_port in authority.split(',') {
        targets.push(parse_host_port(host_port, kind, default)?);
    }
    Ok(targets)
}

/// Parse a single `host`, `host:port`, or bracketed IPv6 `[::1]:port` fragment.
fn parse_host_port(
    fragment: &str,
    kind: DependencyType,
    default: Option<u16>,
) -> Result<ParsedTarget, ConfigError> {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return Err(ConfigError::InvalidName("empty host".into()));
    }

    let (host, port_str) = if let Some(rest) = fragment.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| ConfigError::InvalidName(format!("unterminated IPv6 literal in '{}'", fragment)))?;
        let port = after.strip_prefix(':').filter(|s| !s.is_empty());
        (host.to_string(), port)
    } else {
        match fragment.rsplit_once(':') {
            Some((h, p)) if !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()) => {
                (h.to_string(), Some(p))
            }
            _ => (fragment.to_string(), None),
        }
    };

    if host.is_empty() {
        return Err(ConfigError::InvalidName("empty host".into()));
    }

    let port = match port_str {
        Some(p) => {
            let n: i64 = p
                .parse()
                .map_err(|_| ConfigError::InvalidPort(-1))?;
            crate::model::validate_port(n)?
        }
        None => default.ok_or_else(|| {
            ConfigError::InvalidPort(0)
        })?,
    };

    Ok(ParsedTarget { host, port, kind })
}

/// Parse a JDBC connection string: `jdbc:postgresql://h/db`, `jdbc:mysql://h:3306/db`.
pub fn parse_jdbc(input: &str) -> Result<Vec<ParsedTarget>, ConfigError> {
    let rest = input
        .strip_prefix("jdbc:")
        .ok_or_else(|| ConfigError::UnsupportedScheme(format!("not a jdbc url: '{}'", input)))?;
    parse_url(rest)
}

/// Parse a libpq-style `key=value` connection string, e.g. `host=db port=5432 dbname=x`.
/// Recognizes `host`/`server` as host-key aliases.
pub fn parse_connection_string(
    input: &str,
    kind: DependencyType,
) -> Result<ParsedTarget, ConfigError> {
    let mut host: Option<String> = None;
    let mut port: Option<u16> = None;

    for pair in input.split_whitespace() {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidName(format!("malformed key=value pair '{}'", pair)))?;
        match key {
            "host" | "server" => host = Some(value.to_string()),
            "port" => {
                let n: i64 = value
                    .parse()
                    .map_err(|_| ConfigError::InvalidPort(-1))?;
                port = Some(crate::model::validate_port(n)?);
            }
            _ => {}
        }
    }

    let host = host.ok_or_else(|| ConfigError::InvalidName("connection string missing host".into()))?;
    let port = port.or_else(|| default_port(kind.as_str())).ok_or_else(|| {
        ConfigError::InvalidPort(0)
    })?;

    Ok(ParsedTarget { host, port, kind })
}

/// Render a parsed target back to a URL string, for the round-trip property
/// `parse_url(stringify(parse_url(u))) == parse_url(u)`.
pub fn stringify(target: &ParsedTarget) -> String {
    let scheme = match target.kind {
        DependencyType::Postgres => "postgres",
        DependencyType::Mysql => "mysql",
        DependencyType::Redis => "redis",
        DependencyType::Amqp => "amqp",
        DependencyType::Http => "http",
        DependencyType::Grpc => "grpc",
        DependencyType::Kafka => "kafka",
        DependencyType::Ldap => "ldap",
        DependencyType::Tcp => "tcp",
    };
    if target.host.contains(':') {
        format!("{}://[{}]:{}", scheme, target.host, target.port)
    } else {
        format!("{}://{}:{}", scheme, target.host, target.port)
    }
}
