// crates/suite-relay-config/src/agent.rs
// ============================================================================
// Module: Agent Configuration
// Description: Listener, TLS, execution, engine, artifact, and audit settings.
// Purpose: Validate everything the agent needs before it binds a socket.
// Dependencies: serde, suite-relay-core
// ============================================================================

//! ## Overview
//! [`AgentConfig`] is loaded once at startup. Every failure is a fatal
//! configuration error; nothing here is retried.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use suite_relay_core::validate_relative_path;

use crate::config::ConfigError;
use crate::config::DEFAULT_MAX_PAYLOAD_BYTES;
use crate::config::DEFAULT_TIMEOUT_SECONDS;
use crate::config::read_toml;
use crate::config::resolve_path;
use crate::config::validate_path_string;
use crate::config::validate_payload_limit;
use crate::config::validate_timeout;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default agent configuration filename.
const DEFAULT_CONFIG_NAME: &str = "suite-relay-agent.toml";
/// Environment variable overriding the agent config path.
pub const AGENT_CONFIG_ENV_VAR: &str = "SUITE_RELAY_AGENT_CONFIG";
/// Default listen address.
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8111";
/// Maximum number of requests allowed to wait for the execution slot.
pub const MAX_QUEUE_DEPTH: usize = 64;
/// Default test engine program.
const DEFAULT_ENGINE_PROGRAM: &str = "robot";
/// Maximum number of configured engine arguments.
const MAX_ENGINE_ARGS: usize = 256;

// ============================================================================
// SECTION: Agent Config
// ============================================================================

/// Agent configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Socket address to listen on.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Server certificate chain (PEM).
    pub server_cert_path: String,
    /// Server private key (PEM).
    pub server_key_path: String,
    /// Client CA bundle (PEM); enables mutual TLS when set.
    #[serde(default)]
    pub trusted_client_ca_path: Option<String>,
    /// Upper bound on execution time in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub execution_timeout_seconds: u64,
    /// Requests allowed to wait for the slot before `busy` rejections.
    #[serde(default)]
    pub max_queue_depth: usize,
    /// Maximum envelope payload size in bytes, both directions.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    /// Directory for per-request working directories (system temp when unset).
    #[serde(default)]
    pub work_root: Option<String>,
    /// Test engine invocation.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Artifact collection.
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    /// Audit logging.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl AgentConfig {
    /// Loads agent configuration using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path, AGENT_CONFIG_ENV_VAR, DEFAULT_CONFIG_NAME)?;
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
        self.socket_addr()?;
        validate_path_string("server_cert_path", &self.server_cert_path)?;
        validate_path_string("server_key_path", &self.server_key_path)?;
        if let Some(path) = &self.trusted_client_ca_path {
            validate_path_string("trusted_client_ca_path", path)?;
        }
        if let Some(path) = &self.work_root {
            validate_path_string("work_root", path)?;
        }
        validate_timeout("execution_timeout_seconds", self.execution_timeout_seconds)?;
        if self.max_queue_depth > MAX_QUEUE_DEPTH {
            return Err(ConfigError::Invalid(format!(
                "max_queue_depth must be at most {MAX_QUEUE_DEPTH}"
            )));
        }
        validate_payload_limit("max_payload_bytes", self.max_payload_bytes)?;
        self.engine.validate()?;
        self.artifacts.validate()?;
        self.audit.validate()
    }

    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address is not a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_address
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid("bind_address must be a socket address".to_string()))
    }

    /// Returns true when client certificates are required.
    #[must_use]
    pub const fn mutual_tls(&self) -> bool {
        self.trusted_client_ca_path.is_some()
    }

    /// Returns the configured execution bound.
    #[must_use]
    pub const fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_seconds)
    }
}

// ============================================================================
// SECTION: Engine Config
// ============================================================================

/// Test engine process settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Program to spawn.
    #[serde(default = "default_engine_program")]
    pub program: String,
    /// Arguments placed before forwarded options and the entry point.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the engine process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: default_engine_program(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Validates engine settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("engine.program", &self.program)?;
        if self.args.len() > MAX_ENGINE_ARGS {
            return Err(ConfigError::Invalid(format!(
                "engine.args must contain at most {MAX_ENGINE_ARGS} entries"
            )));
        }
        for key in self.env.keys() {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                return Err(ConfigError::Invalid(format!("engine.env key {key:?} is invalid")));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Artifacts Config
// ============================================================================

/// Artifact collection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactsConfig {
    /// Files always returned when present, even if they were in the bundle.
    #[serde(default = "default_well_known")]
    pub well_known: Vec<String>,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            well_known: default_well_known(),
        }
    }
}

impl ArtifactsConfig {
    /// Validates artifact names as safe relative paths.
    fn validate(&self) -> Result<(), ConfigError> {
        for name in &self.well_known {
            validate_relative_path(name).map_err(|err| {
                ConfigError::Invalid(format!("artifacts.well_known entry invalid: {err}"))
            })?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Audit Config
// ============================================================================

/// Audit logging settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Whether audit events are emitted.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// JSON-lines file to append to (stderr when unset).
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            path: None,
        }
    }
}

impl AuditConfig {
    /// Validates the audit path.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("audit.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default bind address.
fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

/// Default execution timeout.
const fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

/// Default payload limit.
const fn default_max_payload_bytes() -> usize {
    DEFAULT_MAX_PAYLOAD_BYTES
}

/// Default engine program.
fn default_engine_program() -> String {
    DEFAULT_ENGINE_PROGRAM.to_string()
}

/// Default well-known artifact names.
fn default_well_known() -> Vec<String> {
    ["output.xml", "log.html", "report.html"].into_iter().map(str::to_string).collect()
}

/// Audit is on unless disabled.
const fn default_audit_enabled() -> bool {
    true
}
