// crates/suite-relay-config/src/client.rs
// ============================================================================
// Module: Client Configuration
// Description: Agent address, trust anchors, client identity, and retry policy.
// Purpose: Validate client settings before any connection is attempted.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`ClientConfig`] names the agent to reach, the anchor its certificate must
//! chain to, an optional client identity for mutual TLS, and the bounds of
//! the pre-execution retry loop.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::config::ConfigError;
use crate::config::DEFAULT_MAX_PAYLOAD_BYTES;
use crate::config::DEFAULT_TIMEOUT_SECONDS;
use crate::config::MAX_TIMEOUT_SECONDS;
use crate::config::read_toml;
use crate::config::resolve_path;
use crate::config::validate_path_string;
use crate::config::validate_payload_limit;
use crate::config::validate_timeout;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default client configuration filename.
const DEFAULT_CONFIG_NAME: &str = "suite-relay-client.toml";
/// Environment variable overriding the client config path.
pub const CLIENT_CONFIG_ENV_VAR: &str = "SUITE_RELAY_CLIENT_CONFIG";
/// Maximum connection attempts.
pub const MAX_ATTEMPTS: u32 = 10;
/// Maximum delay between attempts in milliseconds.
const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

// ============================================================================
// SECTION: Client Config
// ============================================================================

/// Client configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Agent address as `host:port`.
    pub agent_address: String,
    /// TLS server name; defaults to the host part of `agent_address`.
    #[serde(default)]
    pub server_name: Option<String>,
    /// CA bundle (PEM) the agent certificate must chain to.
    pub trust_anchor_path: String,
    /// Client certificate chain (PEM) for mutual TLS.
    #[serde(default)]
    pub client_cert_path: Option<String>,
    /// Client private key (PEM) for mutual TLS.
    #[serde(default)]
    pub client_key_path: Option<String>,
    /// Connection attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Extra seconds to wait beyond the declared timeout.
    #[serde(default = "default_response_grace_seconds")]
    pub response_grace_seconds: u64,
    /// Maximum envelope payload size in bytes.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    /// Timeout declared when the caller supplies none.
    #[serde(default = "default_timeout_seconds")]
    pub default_timeout_seconds: u64,
}

impl ClientConfig {
    /// Loads client configuration using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path, CLIENT_CONFIG_ENV_VAR, DEFAULT_CONFIG_NAME)?;
        let config: Self = read_toml(&resolved)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.host()?;
        if let Some(name) = &self.server_name
            && name.trim().is_empty()
        {
            return Err(ConfigError::Invalid("server_name must be non-empty".to_string()));
        }
        validate_path_string("trust_anchor_path", &self.trust_anchor_path)?;
        match (&self.client_cert_path, &self.client_key_path) {
            (Some(cert), Some(key)) => {
                validate_path_string("client_cert_path", cert)?;
                validate_path_string("client_key_path", key)?;
            }
            (None, None) => {}
            _ => {
                return Err(ConfigError::Invalid(
                    "client_cert_path and client_key_path must be set together".to_string(),
                ));
            }
        }
        if !(1 ..= MAX_ATTEMPTS).contains(&self.max_attempts) {
            return Err(ConfigError::Invalid(format!(
                "max_attempts must be between 1 and {MAX_ATTEMPTS}"
            )));
        }
        if self.retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
            return Err(ConfigError::Invalid(format!(
                "retry_backoff_ms must be at most {MAX_RETRY_BACKOFF_MS}"
            )));
        }
        if self.response_grace_seconds > MAX_TIMEOUT_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "response_grace_seconds must be at most {MAX_TIMEOUT_SECONDS}"
            )));
        }
        validate_payload_limit("max_payload_bytes", self.max_payload_bytes)?;
        validate_timeout("default_timeout_seconds", self.default_timeout_seconds)
    }

    /// Returns the host part of `agent_address` without IPv6 brackets.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address is not `host:port`.
    pub fn host(&self) -> Result<&str, ConfigError> {
        let invalid = || ConfigError::Invalid("agent_address must be host:port".to_string());
        let (host, port) = self.agent_address.trim().rsplit_once(':').ok_or_else(invalid)?;
        port.parse::<u16>().map_err(|_| invalid())?;
        let host = host.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')).unwrap_or(host);
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(host)
    }

    /// Returns the TLS server name to verify.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address is malformed.
    pub fn resolved_server_name(&self) -> Result<String, ConfigError> {
        match &self.server_name {
            Some(name) => Ok(name.trim().to_string()),
            None => self.host().map(str::to_string),
        }
    }

    /// Returns the delay between attempts.
    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Returns the extra wait beyond the declared timeout.
    #[must_use]
    pub const fn response_grace(&self) -> Duration {
        Duration::from_secs(self.response_grace_seconds)
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default connection attempts.
const fn default_max_attempts() -> u32 {
    3
}

/// Default retry delay.
const fn default_retry_backoff_ms() -> u64 {
    500
}

/// Default response grace.
const fn default_response_grace_seconds() -> u64 {
    30
}

/// Default payload limit.
const fn default_max_payload_bytes() -> usize {
    DEFAULT_MAX_PAYLOAD_BYTES
}

/// Default declared timeout.
const fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}
