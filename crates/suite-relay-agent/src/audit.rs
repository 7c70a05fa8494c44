// crates/suite-relay-agent/src/audit.rs
// ============================================================================
// Module: Agent Audit Logging
// Description: Structured audit events for connections and executions.
// Purpose: Emit JSON-lines audit logs without hard dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every accepted connection, failed accept, phase transition, rejection,
//! and cleanup failure is recorded as one JSON object per line. Sinks are pluggable so
//! deployments can route events to their preferred pipeline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Agent audit event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Agent bound its listener.
    AgentStarted {
        /// Event timestamp (milliseconds since epoch).
        timestamp_ms: u128,
        /// Bound listen address.
        bind_address: String,
        /// Whether client certificates are required.
        mutual_tls: bool,
        /// Agent software version.
        agent_version: &'static str,
    },
    /// TLS handshake completed.
    ConnectionAccepted {
        /// Event timestamp (milliseconds since epoch).
        timestamp_ms: u128,
        /// Remote address.
        peer_addr: String,
        /// Certificate fingerprint or `anonymous`.
        peer_identity: String,
    },
    /// Listener failed to accept a connection.
    AcceptFailed {
        /// Event timestamp (milliseconds since epoch).
        timestamp_ms: u128,
        /// Failure description.
        message: String,
    },
    /// TLS handshake failed.
    HandshakeFailed {
        /// Event timestamp (milliseconds since epoch).
        timestamp_ms: u128,
        /// Remote address.
        peer_addr: String,
        /// Failure description.
        message: String,
    },
    /// Execution moved to a new phase.
    ExecutionPhase {
        /// Event timestamp (milliseconds since epoch).
        timestamp_ms: u128,
        /// Request identifier.
        request_id: String,
        /// Phase label.
        phase: &'static str,
        /// Optional detail (status, error, digest).
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    /// Request was refused.
    RequestRejected {
        /// Event timestamp (milliseconds since epoch).
        timestamp_ms: u128,
        /// Request identifier when known.
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        /// Rejection code label.
        code: &'static str,
        /// Rejection message.
        message: String,
    },
    /// Working directory removal failed.
    CleanupFailed {
        /// Event timestamp (milliseconds since epoch).
        timestamp_ms: u128,
        /// Request identifier.
        request_id: String,
        /// Directory that could not be removed.
        path: String,
        /// Failure description.
        message: String,
    },
}

impl AuditEvent {
    /// Builds an `agent_started` event.
    #[must_use]
    pub fn agent_started(bind_address: String, mutual_tls: bool) -> Self {
        Self::AgentStarted {
            timestamp_ms: now_millis(),
            bind_address,
            mutual_tls,
            agent_version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Builds a `connection_accepted` event.
    #[must_use]
    pub fn connection_accepted(peer_addr: String, peer_identity: String) -> Self {
        Self::ConnectionAccepted {
            timestamp_ms: now_millis(),
            peer_addr,
            peer_identity,
        }
    }

    /// Builds an `accept_failed` event.
    #[must_use]
    pub fn accept_failed(message: String) -> Self {
        Self::AcceptFailed {
            timestamp_ms: now_millis(),
            message,
        }
    }

    /// Builds a `handshake_failed` event.
    #[must_use]
    pub fn handshake_failed(peer_addr: String, message: String) -> Self {
        Self::HandshakeFailed {
            timestamp_ms: now_millis(),
            peer_addr,
            message,
        }
    }

    /// Builds an `execution_phase` event.
    #[must_use]
    pub fn execution_phase(request_id: String, phase: &'static str, detail: Option<String>) -> Self {
        Self::ExecutionPhase {
            timestamp_ms: now_millis(),
            request_id,
            phase,
            detail,
        }
    }

    /// Builds a `request_rejected` event.
    #[must_use]
    pub fn request_rejected(request_id: Option<String>, code: &'static str, message: String) -> Self {
        Self::RequestRejected {
            timestamp_ms: now_millis(),
            request_id,
            code,
            message,
        }
    }

    /// Builds a `cleanup_failed` event.
    #[must_use]
    pub fn cleanup_failed(request_id: String, path: String, message: String) -> Self {
        Self::CleanupFailed {
            timestamp_ms: now_millis(),
            request_id,
            path,
            message,
        }
    }

    /// Returns the event label.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AgentStarted { .. } => "agent_started",
            Self::ConnectionAccepted { .. } => "connection_accepted",
            Self::AcceptFailed { .. } => "accept_failed",
            Self::HandshakeFailed { .. } => "handshake_failed",
            Self::ExecutionPhase { .. } => "execution_phase",
            Self::RequestRejected { .. } => "request_rejected",
            Self::CleanupFailed { .. } => "cleanup_failed",
        }
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for agent events.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &AuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &AuditEvent) {}
}

/// Audit sink that keeps events in memory for inspection.
#[derive(Default)]
pub struct MemoryAuditSink {
    /// Recorded events in arrival order.
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the current time in milliseconds since the Unix epoch.
fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |duration| duration.as_millis())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
