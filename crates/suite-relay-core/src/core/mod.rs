// crates/suite-relay-core/src/core/mod.rs
// ============================================================================
// Module: Suite Relay Core Types
// Description: Canonical bundle, request, and result structures.
// Purpose: Provide stable, serializable types shared by agent and client.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Core types define suite bundles, execution requests and results, and the
//! identifiers and digests that tie them together. They are the canonical
//! source of truth for everything carried inside an envelope.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod bundle;
pub mod execution;
pub mod hashing;
pub mod identifiers;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bundle::BundleError;
pub use bundle::ExecutionOptions;
pub use bundle::FileEntry;
pub use bundle::OptionValue;
pub use bundle::SuiteBundle;
pub use bundle::validate_relative_path;
pub use execution::AgentStatus;
pub use execution::ExecutionAccepted;
pub use execution::ExecutionRequest;
pub use execution::ExecutionResult;
pub use execution::ExecutionStatus;
pub use execution::Rejection;
pub use execution::RejectionCode;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::hash_canonical_json;
pub use identifiers::RequestId;
