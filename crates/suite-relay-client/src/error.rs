// crates/suite-relay-client/src/error.rs
// ============================================================================
// Module: Client Errors
// Description: Error taxonomy for suite submission.
// Purpose: Let callers branch on failure class and retryability.
// Dependencies: thiserror, suite-relay-core, suite-relay-transport
// ============================================================================

//! ## Overview
//! A failure is retryable only when the agent cannot have observed the
//! request: handshake failures, refused connections, and resets before any
//! response byte. Everything after the first response byte is final.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::ErrorKind;

use suite_relay_config::ConfigError;
use suite_relay_core::EnvelopeError;
use suite_relay_core::PackError;
use suite_relay_core::RejectionCode;
use suite_relay_transport::TransportError;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Suite directory could not be packed.
    #[error("failed to package suite: {0}")]
    Pack(PackError),
    /// Connection or handshake failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Connection dropped before the agent sent anything.
    #[error("connection reset before any response: {0}")]
    Reset(String),
    /// Connection dropped after the agent started responding.
    #[error("connection lost after the agent responded: {0}")]
    ConnectionLost(String),
    /// Agent did not answer within the allowed time.
    #[error("no response from agent within {seconds}s")]
    ResponseTimeout {
        /// Seconds waited.
        seconds: u64,
    },
    /// Agent refused the request.
    #[error("agent rejected the request ({code}): {message}")]
    Rejected {
        /// Rejection classification.
        code: RejectionCode,
        /// Agent-supplied detail.
        message: String,
    },
    /// Request or result exceeds the configured maximum payload.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    /// Agent sent something that violates the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Returned artifacts could not be written locally.
    #[error("failed to write artifacts: {0}")]
    Materialize(PackError),
}

impl ClientError {
    /// Returns true when the same request may be sent again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_retryable(),
            Self::Reset(_) => true,
            _ => false,
        }
    }

    /// Classifies a failure to read the first response frame.
    ///
    /// TLS alerts (for example a refused client certificate under TLS 1.3)
    /// surface on the first read as `InvalidData`.
    #[must_use]
    pub fn from_first_read(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Io {
                message,
                kind: ErrorKind::InvalidData,
                started: false,
            } => Self::Transport(TransportError::Handshake(message)),
            EnvelopeError::Io {
                message,
                started: false,
                ..
            } => Self::Reset(message),
            other => Self::from_later_read(other),
        }
    }

    /// Classifies a failure after response bytes were seen.
    #[must_use]
    pub fn from_later_read(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Io {
                message,
                ..
            } => Self::ConnectionLost(message),
            EnvelopeError::TooLarge {
                ..
            } => Self::PayloadTooLarge(err.to_string()),
            other => Self::Protocol(other.to_string()),
        }
    }

    /// Classifies a failure to send the request.
    #[must_use]
    pub fn from_write(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Io {
                message,
                kind: ErrorKind::InvalidData,
                ..
            } => Self::Transport(TransportError::Handshake(message)),
            EnvelopeError::Io {
                message,
                ..
            } => Self::Reset(message),
            other => Self::Protocol(other.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
