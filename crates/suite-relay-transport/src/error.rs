// crates/suite-relay-transport/src/error.rs
// ============================================================================
// Module: Transport Errors
// Description: Error taxonomy for TLS setup, binding, and connecting.
// Purpose: Let callers distinguish fatal setup faults from retryable ones.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Configuration and bind failures are fatal at startup. Handshake and connect
//! failures are the only transport errors a client may retry.

use thiserror::Error;

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Certificate, key, or trust material is unreadable, empty, or mismatched.
    #[error("tls configuration error: {0}")]
    Configuration(String),
    /// Listen address is unavailable.
    #[error("bind error: {0}")]
    Bind(String),
    /// TLS handshake failed (untrusted issuer, name mismatch, refused client).
    #[error("tls handshake failed: {0}")]
    Handshake(String),
    /// Network-level connection failure.
    #[error("connect error: {0}")]
    Connect(String),
    /// Socket I/O failure outside the handshake.
    #[error("transport io error: {0}")]
    Io(String),
}

impl TransportError {
    /// Returns true when a client may retry the operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Handshake(_) | Self::Connect(_))
    }
}
