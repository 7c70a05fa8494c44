// crates/suite-relay-config/src/config.rs
// ============================================================================
// Module: Config Loading
// Description: Shared file resolution, size limits, and field validators.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, toml
// ============================================================================

//! ## Overview
//! Shared loading rules for agent and client configuration. A file is resolved
//! from the CLI path, then an environment variable, then a default filename.
//! Files larger than [`MAX_CONFIG_FILE_SIZE`] or with oversized paths fail
//! closed before parsing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Smallest accepted envelope payload limit.
pub(crate) const MIN_PAYLOAD_BYTES: usize = 1024;
/// Largest accepted envelope payload limit.
pub(crate) const MAX_PAYLOAD_BYTES: usize = 1024 * 1024 * 1024;
/// Default envelope payload limit.
pub(crate) const DEFAULT_MAX_PAYLOAD_BYTES: usize = 64 * 1024 * 1024;
/// Largest accepted execution timeout in seconds.
pub(crate) const MAX_TIMEOUT_SECONDS: u64 = 86_400;
/// Default execution timeout in seconds.
pub(crate) const DEFAULT_TIMEOUT_SECONDS: u64 = 3_600;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Resolves a config path from the CLI, the environment, or a default name.
pub(crate) fn resolve_path(
    path: Option<&Path>,
    env_var: &str,
    default_name: &str,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(env_var) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(default_name))
}

/// Reads and parses a TOML file under the size and path limits.
pub(crate) fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    validate_path(path)?;
    let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
    if bytes.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
    }
    let content = std::str::from_utf8(&bytes)
        .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
    toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
}

// ============================================================================
// SECTION: Validators
// ============================================================================

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
pub(crate) fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates an envelope payload limit.
pub(crate) fn validate_payload_limit(field: &str, value: usize) -> Result<(), ConfigError> {
    if !(MIN_PAYLOAD_BYTES ..= MAX_PAYLOAD_BYTES).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{field} must be between {MIN_PAYLOAD_BYTES} and {MAX_PAYLOAD_BYTES}"
        )));
    }
    Ok(())
}

/// Validates an execution timeout in seconds.
pub(crate) fn validate_timeout(field: &str, value: u64) -> Result<(), ConfigError> {
    if !(1 ..= MAX_TIMEOUT_SECONDS).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{field} must be between 1 and {MAX_TIMEOUT_SECONDS}"
        )));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
