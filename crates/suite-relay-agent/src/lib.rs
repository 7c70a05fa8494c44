// crates/suite-relay-agent/src/lib.rs
// ============================================================================
// Module: Suite Relay Agent Library
// Description: Remote execution agent for packaged test suites.
// Purpose: Accept suites over TLS, run them one at a time, return artifacts.
// Dependencies: suite-relay-core, suite-relay-config, suite-relay-transport
// ============================================================================

//! ## Overview
//! [`AgentRuntime`] binds the TLS listener and serves `Execute` and `Ping`
//! requests. Executions pass through a single [`ExecutionSlot`], are
//! deduplicated by an [`IdempotencyLedger`], and run inside an
//! [`Orchestrator`] that owns the per-request working directory. The test
//! runner sits behind the [`ExecutionEngine`] trait; [`ProcessEngine`] spawns
//! a real process.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod result;
pub mod runtime;
pub mod slot;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditEvent;
pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::MemoryAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use engine::EngineError;
pub use engine::EngineOutput;
pub use engine::ExecutionEngine;
pub use engine::NO_EXIT_CODE;
pub use engine::ProcessEngine;
pub use error::AgentError;
pub use ledger::Admission;
pub use ledger::IdempotencyLedger;
pub use orchestrator::ExecutionPhase;
pub use orchestrator::Orchestrator;
pub use orchestrator::OrchestratorError;
pub use result::ResultError;
pub use result::package;
pub use runtime::AGENT_VERSION;
pub use runtime::AgentRuntime;
pub use runtime::audit_sink;
pub use slot::ExecutionSlot;
pub use slot::SlotBusy;
pub use slot::SlotPermit;
