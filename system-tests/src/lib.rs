// system-tests/src/lib.rs
// ============================================================================
// Module: Suite Relay System Tests Library
// Description: Shared fixtures for end-to-end relay scenarios.
// Purpose: Provide TLS material and scripted engines to the test binaries.
// Dependencies: rcgen, suite-relay-agent, tempfile, tokio
// ============================================================================

//! ## Overview
//! Fixtures used by the scenarios in `system-tests/tests`. Certificates are
//! generated per test run so no private key is committed, and the engines
//! stand in for a real test runner so scenarios stay deterministic.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod engines;
pub mod tls;
