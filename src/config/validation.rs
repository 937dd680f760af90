//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Keep the unauthenticated RPC endpoint on loopback
//! - Validate value ranges (timeouts > 0, attempts >= 1)
//! - Check that the reload signal and source URL are usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ManagerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{ManagerConfig, SourceConfig};
use crate::supervisor::parse_signal;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("rpc.bind_address '{0}' is not a socket address")]
    BadBindAddress(String),

    #[error("rpc.bind_address '{0}' is not a loopback address")]
    NotLoopback(String),

    #[error("rpc.path '{0}' must start with '/'")]
    BadRpcPath(String),

    #[error("rpc.path '{0}' collides with the status endpoint")]
    ReservedRpcPath(String),

    #[error("child.binary must not be empty")]
    EmptyBinary,

    #[error("child.reload_signal '{0}' is not a known signal")]
    UnknownSignal(String),

    #[error("store.path must name a file")]
    BadStorePath,

    #[error("source.url '{0}' is not an http(s) URL")]
    BadSourceUrl(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ManagerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match config.rpc.bind_address.parse::<SocketAddr>() {
        Ok(addr) if !addr.ip().is_loopback() => {
            errors.push(ValidationError::NotLoopback(config.rpc.bind_address.clone()))
        }
        Ok(_) => {}
        Err(_) => errors.push(ValidationError::BadBindAddress(
            config.rpc.bind_address.clone(),
        )),
    }

    if !config.rpc.path.starts_with('/') {
        errors.push(ValidationError::BadRpcPath(config.rpc.path.clone()));
    } else if config.rpc.path == "/status" {
        errors.push(ValidationError::ReservedRpcPath(config.rpc.path.clone()));
    }
    if config.rpc.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero("rpc.request_timeout_secs"));
    }

    if config.child.binary.as_os_str().is_empty() {
        errors.push(ValidationError::EmptyBinary);
    }
    if parse_signal(&config.child.reload_signal).is_none() {
        errors.push(ValidationError::UnknownSignal(
            config.child.reload_signal.clone(),
        ));
    }

    if config.store.path.file_name().is_none() {
        errors.push(ValidationError::BadStorePath);
    }
    if config.store.max_bytes == 0 {
        errors.push(ValidationError::Zero("store.max_bytes"));
    }

    if let SourceConfig::Http { url } = &config.source {
        let ok = url::Url::parse(url)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !ok {
            errors.push(ValidationError::BadSourceUrl(url.clone()));
        }
    }

    if config.reload.fetch_attempts == 0 {
        errors.push(ValidationError::Zero("reload.fetch_attempts"));
    }
    if config.reload.fetch_timeout_secs == 0 {
        errors.push(ValidationError::Zero("reload.fetch_timeout_secs"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&ManagerConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_public_bind_address() {
        let mut config = ManagerConfig::default();
        config.rpc.bind_address = "0.0.0.0:8000".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::NotLoopback("0.0.0.0:8000".into())]
        );
    }

    #[test]
    fn test_ipv6_loopback_allowed() {
        let mut config = ManagerConfig::default();
        config.rpc.bind_address = "[::1]:8000".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_rejects_unknown_signal_and_bad_url() {
        let mut config = ManagerConfig::default();
        config.child.reload_signal = "SIGBOGUS".into();
        config.source = SourceConfig::Http {
            url: "ftp://authority/config".into(),
        };
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::UnknownSignal("SIGBOGUS".into())));
        assert!(errors.contains(&ValidationError::BadSourceUrl(
            "ftp://authority/config".into()
        )));
    }

    #[test]
    fn test_rejects_zero_values() {
        let mut config = ManagerConfig::default();
        config.store.max_bytes = 0;
        config.reload.fetch_timeout_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_rpc_path_cannot_shadow_status() {
        let mut config = ManagerConfig::default();
        config.rpc.path = "/status".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::ReservedRpcPath("/status".into())]
        );
    }
}
