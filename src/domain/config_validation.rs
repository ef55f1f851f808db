//! Configuration validation.
//!
//! Validates store and server settings before anything is opened.

use crate::domain::error::StsError;
use crate::ports::config_port::ConfigPort;
use std::net::SocketAddr;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub const DEFAULT_INTEREST_RATE: f64 = 0.0035;

/// Storage backend named by `[database] backend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Postgres,
}

pub fn validate_store_config(config: &dyn ConfigPort) -> Result<Backend, StsError> {
    let backend = backend(config)?;
    match backend {
        Backend::Sqlite => {
            config.require_string("sqlite", "path")?;
            validate_positive(config, "sqlite", "pool_size", 4)?;
            validate_positive(config, "sqlite", "busy_timeout_ms", 5000)?;
        }
        Backend::Postgres => {
            config.require_string("postgres", "connection_string")?;
            validate_positive(config, "postgres", "pool_size", 8)?;
        }
    }
    validate_interest_rate(config)?;
    Ok(backend)
}

pub fn validate_server_config(config: &dyn ConfigPort) -> Result<(), StsError> {
    validate_store_config(config)?;
    listen_addr(config)?;
    validate_positive(config, "web", "request_timeout_secs", 30)?;
    Ok(())
}

pub fn backend(config: &dyn ConfigPort) -> Result<Backend, StsError> {
    match config
        .get_string("database", "backend")
        .as_deref()
        .map(str::trim)
    {
        None | Some("sqlite") => Ok(Backend::Sqlite),
        Some("postgres") => Ok(Backend::Postgres),
        Some(other) => Err(StsError::ConfigInvalid {
            section: "database".to_string(),
            key: "backend".to_string(),
            reason: format!("unknown backend '{other}', expected sqlite or postgres"),
        }),
    }
}

pub fn listen_addr(config: &dyn ConfigPort) -> Result<SocketAddr, StsError> {
    let raw = config
        .get_string("web", "listen")
        .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
    raw.parse().map_err(|_| StsError::ConfigInvalid {
        section: "web".to_string(),
        key: "listen".to_string(),
        reason: format!("'{raw}' is not a socket address"),
    })
}

pub fn interest_rate(config: &dyn ConfigPort) -> f64 {
    config.get_double("interest", "rate", DEFAULT_INTEREST_RATE)
}

fn validate_interest_rate(config: &dyn ConfigPort) -> Result<(), StsError> {
    let rate = interest_rate(config);
    if !(0.0..1.0).contains(&rate) {
        return Err(StsError::ConfigInvalid {
            section: "interest".to_string(),
            key: "rate".to_string(),
            reason: "rate must be between 0 and 1".to_string(),
        });
    }
    Ok(())
}

fn validate_positive(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<(), StsError> {
    if config.get_int(section, key, default) <= 0 {
        return Err(StsError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("{key} must be positive"),
        });
    }
    Ok(())
}
