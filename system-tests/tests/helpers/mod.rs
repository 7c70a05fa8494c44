// system-tests/tests/helpers/mod.rs
// ============================================================================
// Module: System Test Helpers
// Description: Agent harness and client configuration for scenarios.
// Purpose: Start agents on ephemeral ports and build matching clients.
// Dependencies: system-tests, suite-relay-agent, suite-relay-client
// ============================================================================

#![allow(dead_code, reason = "Shared helpers are reused across multiple test suites.")]

pub mod harness;
