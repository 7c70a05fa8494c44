// crates/suite-relay-client/src/lib.rs
// ============================================================================
// Module: Suite Relay Client Library
// Description: Client side of the suite relay protocol.
// Purpose: Submit suites to a remote agent and retrieve their artifacts.
// Dependencies: suite-relay-core, suite-relay-config, suite-relay-transport
// ============================================================================

//! ## Overview
//! [`RelayClient`] wraps a validated [`suite_relay_config::ClientConfig`] and
//! a TLS connector. It packs suites, retries only failures the agent cannot
//! have observed, and materializes returned artifacts locally.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod client;
pub mod error;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use client::DEFAULT_EXTENSIONS;
pub use client::Delivered;
pub use client::RelayClient;
pub use client::SuiteJob;
pub use client::SuiteOutcome;
pub use client::exchange_execute;
pub use client::exchange_ping;
pub use client::materialize;
pub use error::ClientError;
