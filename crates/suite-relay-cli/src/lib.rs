// crates/suite-relay-cli/src/lib.rs
// ============================================================================
// Module: Suite Relay CLI Library
// Description: Shared helpers for the suite-relay command-line interface.
// Purpose: Provide the message catalog and option mapping to the binary and tests.
// Dependencies: suite-relay-core, thiserror
// ============================================================================

//! ## Overview
//! The binary entry point (`src/main.rs`) is thin glue over the agent and
//! client crates. Helpers that deserve tests of their own live here.

// ============================================================================
// SECTION: Modules
// ============================================================================

/// Message catalog and the `t!` macro.
pub mod i18n;
/// Mapping of CLI flags to engine options.
pub mod options;
