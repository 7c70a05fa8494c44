// crates/suite-relay-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared TOML fixtures for config validation tests.
// Purpose: Reduce duplication across integration tests for suite-relay-config.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use suite_relay_config::AgentConfig;
use suite_relay_config::ClientConfig;

/// Minimal valid agent TOML.
pub const MINIMAL_AGENT: &str = r#"
server_cert_path = "certs/server.pem"
server_key_path = "certs/server.key"
"#;

/// Minimal valid client TOML.
pub const MINIMAL_CLIENT: &str = r#"
agent_address = "agent.local:8111"
trust_anchor_path = "certs/ca.pem"
"#;

/// Parses agent TOML with extra lines appended to the minimal fixture.
pub fn agent_with(extra: &str) -> Result<AgentConfig, toml::de::Error> {
    toml::from_str(&format!("{MINIMAL_AGENT}\n{extra}"))
}

/// Parses client TOML with extra lines appended to the minimal fixture.
pub fn client_with(extra: &str) -> Result<ClientConfig, toml::de::Error> {
    toml::from_str(&format!("{MINIMAL_CLIENT}\n{extra}"))
}
