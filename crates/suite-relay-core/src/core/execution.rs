// crates/suite-relay-core/src/core/execution.rs
// ============================================================================
// Module: Execution Messages
// Description: Requests, results, rejections, and agent status payloads.
// Purpose: Define the typed payloads carried inside envelopes.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! These are the payload types exchanged between the client and the agent.
//! [`ExecutionStatus`] is the outcome taxonomy callers branch on: a `Timeout`
//! is a normal result, not a protocol failure, and transport faults never show
//! up here at all.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::bundle::FileEntry;
use crate::core::bundle::SuiteBundle;
use crate::core::identifiers::RequestId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Highest exit code still interpreted as a failed-test count.
pub const MAX_TEST_FAILURE_EXIT_CODE: i32 = 250;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Request to execute a suite on the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Correlation and idempotency token.
    pub request_id: RequestId,
    /// Client-declared execution timeout in seconds.
    pub timeout_seconds: u64,
    /// Suite to execute.
    pub bundle: SuiteBundle,
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Outcome classification of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Engine exited cleanly with every test passing.
    Success,
    /// Engine ran and reported failing tests.
    TestFailures,
    /// Engine could not run the suite.
    ExecutionError,
    /// Engine was terminated at the deadline.
    Timeout,
}

impl ExecutionStatus {
    /// Classifies an engine exit code.
    ///
    /// `0` is success, `1..=250` counts failed tests, and everything else
    /// (usage errors, interrupts, crashes, signals) is an execution error.
    #[must_use]
    pub const fn from_exit_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            1..=MAX_TEST_FAILURE_EXIT_CODE => Self::TestFailures,
            _ => Self::ExecutionError,
        }
    }

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::TestFailures => "TEST_FAILURES",
            Self::ExecutionError => "EXECUTION_ERROR",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Request this result answers.
    pub request_id: RequestId,
    /// Outcome classification.
    pub status: ExecutionStatus,
    /// Engine exit code (`-1` when the engine never reported one).
    pub exit_code: i32,
    /// Artifacts produced by the run.
    pub artifacts: Vec<FileEntry>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Optional diagnostic message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// SECTION: Acknowledgements
// ============================================================================

/// Acknowledgement sent once an execution holds the slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionAccepted {
    /// Request that started executing.
    pub request_id: RequestId,
    /// Effective timeout enforced by the agent in seconds.
    pub effective_timeout_seconds: u64,
}

// ============================================================================
// SECTION: Rejections
// ============================================================================

/// Structured rejection codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCode {
    /// Request failed validation; nothing was created.
    InvalidRequest,
    /// Execution slot is occupied and the queue is full.
    Busy,
    /// Identifier matches a run that is still in flight.
    DuplicateRequest,
    /// Encoded result exceeds the configured maximum message size.
    PayloadTooLarge,
    /// Incoming frame could not be decoded.
    MalformedEnvelope,
    /// Unexpected agent-side failure.
    Internal,
}

impl RejectionCode {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Busy => "busy",
            Self::DuplicateRequest => "duplicate_request",
            Self::PayloadTooLarge => "payload_too_large",
            Self::MalformedEnvelope => "malformed_envelope",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured refusal returned instead of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Rejection classification.
    pub code: RejectionCode,
    /// Human-readable detail.
    pub message: String,
}

impl Rejection {
    /// Creates a rejection.
    #[must_use]
    pub fn new(code: RejectionCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

// ============================================================================
// SECTION: Agent Status
// ============================================================================

/// Liveness and version report returned by `Ping`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    /// Envelope protocol version spoken by the agent.
    pub protocol_version: u16,
    /// Agent software version.
    pub agent_version: String,
    /// Whether an execution currently holds the slot.
    pub busy: bool,
    /// Whether the agent requires client certificates.
    pub mutual_tls: bool,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::ExecutionStatus;

    #[test]
    fn exit_codes_classify_by_failure_count_convention() {
        assert_eq!(ExecutionStatus::from_exit_code(0), ExecutionStatus::Success);
        assert_eq!(ExecutionStatus::from_exit_code(1), ExecutionStatus::TestFailures);
        assert_eq!(ExecutionStatus::from_exit_code(250), ExecutionStatus::TestFailures);
        assert_eq!(ExecutionStatus::from_exit_code(251), ExecutionStatus::ExecutionError);
        assert_eq!(ExecutionStatus::from_exit_code(255), ExecutionStatus::ExecutionError);
        assert_eq!(ExecutionStatus::from_exit_code(-9), ExecutionStatus::ExecutionError);
    }

    #[test]
    fn status_serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&ExecutionStatus::TestFailures).ok();
        assert_eq!(json.as_deref(), Some("\"TEST_FAILURES\""));
    }
}
