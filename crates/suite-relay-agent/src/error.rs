// crates/suite-relay-agent/src/error.rs
// ============================================================================
// Module: Agent Errors
// Description: Startup and serving failures for the agent runtime.
// Purpose: Give the binary one error type to report and exit on.
// Dependencies: thiserror, suite-relay-config, suite-relay-transport
// ============================================================================

//! ## Overview
//! Per-request failures never surface here; they become rejections or
//! results on the wire. [`AgentError`] covers what stops the agent itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use suite_relay_config::ConfigError;
use suite_relay_transport::TransportError;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Fatal agent errors.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Listener could not be set up.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Local filesystem setup failed.
    #[error("agent io error: {0}")]
    Io(String),
}
