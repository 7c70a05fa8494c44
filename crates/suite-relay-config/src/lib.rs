// crates/suite-relay-config/src/lib.rs
// ============================================================================
// Module: Suite Relay Config Library
// Description: Agent and client configuration models and validation.
// Purpose: Single source of truth for suite-relay TOML semantics.
// Dependencies: serde, suite-relay-core, toml
// ============================================================================

//! ## Overview
//! `suite-relay-config` defines the configuration models for both ends of the
//! wire. Agent and client files are TOML, resolved from an explicit path, an
//! environment override, or a default filename, and validated fail-closed.
//!
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod agent;
pub mod client;
pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use agent::AgentConfig;
pub use agent::ArtifactsConfig;
pub use agent::AuditConfig;
pub use agent::EngineConfig;
pub use client::ClientConfig;
pub use config::ConfigError;
