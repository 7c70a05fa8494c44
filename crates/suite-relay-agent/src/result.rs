// crates/suite-relay-agent/src/result.rs
// ============================================================================
// Module: Result Packager
// Description: Wrap execution results in size-bounded response envelopes.
// Purpose: Refuse to send results the client is configured to reject.
// Dependencies: suite-relay-core
// ============================================================================

//! ## Overview
//! Results are serialized once and checked against the configured maximum
//! before anything is written to the wire. Oversized results become a
//! `payload_too_large` rejection instead of a truncated frame.

// ============================================================================
// SECTION: Imports
// ============================================================================

use suite_relay_core::Envelope;
use suite_relay_core::EnvelopeError;
use suite_relay_core::ExecutionResult;
use suite_relay_core::PayloadKind;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Result packaging errors.
#[derive(Debug, Error)]
pub enum ResultError {
    /// Encoded envelope exceeds the configured maximum.
    #[error("encoded result of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge {
        /// Encoded envelope size.
        size: usize,
        /// Configured maximum.
        limit: usize,
    },
    /// Envelope construction failed.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

// ============================================================================
// SECTION: Packaging
// ============================================================================

/// Wraps a result in a response envelope no larger than `max_payload_bytes`.
///
/// # Errors
///
/// Returns [`ResultError::PayloadTooLarge`] when the encoded envelope would
/// exceed the limit.
pub fn package(result: &ExecutionResult, max_payload_bytes: usize) -> Result<Envelope, ResultError> {
    let envelope =
        Envelope::from_message(result.request_id.clone(), PayloadKind::ExecutionResult, result)?;
    let size = envelope.encoded_len();
    if size > max_payload_bytes {
        return Err(ResultError::PayloadTooLarge {
            size,
            limit: max_payload_bytes,
        });
    }
    Ok(envelope)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only packaging assertions."
    )]

    use suite_relay_core::ExecutionStatus;
    use suite_relay_core::FileEntry;
    use suite_relay_core::RequestId;

    use super::*;

    fn result_with_artifact(size: usize) -> ExecutionResult {
        ExecutionResult {
            request_id: RequestId::new("req"),
            status: ExecutionStatus::Success,
            exit_code: 0,
            artifacts: vec![FileEntry::new("log.html", vec![b'a'; size])],
            stdout: String::new(),
            stderr: String::new(),
            message: None,
        }
    }

    #[test]
    fn small_result_fits() {
        let envelope = package(&result_with_artifact(16), 4096).unwrap();
        assert_eq!(envelope.kind(), PayloadKind::ExecutionResult);
        let decoded: ExecutionResult = envelope.message(PayloadKind::ExecutionResult).unwrap();
        assert_eq!(decoded, result_with_artifact(16));
    }

    #[test]
    fn oversized_result_is_refused() {
        let err = package(&result_with_artifact(8192), 4096).unwrap_err();
        assert!(matches!(err, ResultError::PayloadTooLarge { limit: 4096, .. }));
    }
}
