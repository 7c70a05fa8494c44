// crates/suite-relay-config/tests/client_validation.rs
// ============================================================================
// Module: Client Config Validation Tests
// Description: Defaults, address parsing, and identity pairing for clients.
// ============================================================================
//! ## Overview
//! Validates client defaults, server name resolution, and retry bounds.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Tests use unwrap on deterministic fixtures."
)]

mod common;

use std::time::Duration;

use suite_relay_config::ClientConfig;
use suite_relay_config::ConfigError;

#[test]
fn minimal_client_config_applies_defaults() {
    let config = common::client_with("").unwrap();
    config.validate().unwrap();
    assert_eq!(config.max_attempts, 3);
    assert_eq!(config.retry_backoff(), Duration::from_millis(500));
    assert_eq!(config.response_grace(), Duration::from_secs(30));
    assert_eq!(config.resolved_server_name().unwrap(), "agent.local");
}

#[test]
fn explicit_server_name_wins() {
    let config = common::client_with("server_name = \"localhost\"").unwrap();
    assert_eq!(config.resolved_server_name().unwrap(), "localhost");
}

#[test]
fn ipv6_host_is_unbracketed() {
    let config: ClientConfig = toml::from_str(
        "agent_address = \"[::1]:8111\"\ntrust_anchor_path = \"certs/ca.pem\"",
    )
    .unwrap();
    config.validate().unwrap();
    assert_eq!(config.host().unwrap(), "::1");
}

#[test]
fn address_without_port_is_rejected() {
    let config: ClientConfig =
        toml::from_str("agent_address = \"agent.local\"\ntrust_anchor_path = \"ca.pem\"").unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn client_cert_without_key_is_rejected() {
    let config = common::client_with("client_cert_path = \"certs/client.pem\"").unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("set together"));
}

#[test]
fn client_identity_pair_is_accepted() {
    let config = common::client_with(
        "client_cert_path = \"certs/client.pem\"\nclient_key_path = \"certs/client.key\"",
    )
    .unwrap();
    assert!(config.validate().is_ok());
}

#[test]
fn max_attempts_bounds_are_enforced() {
    assert!(common::client_with("max_attempts = 0").unwrap().validate().is_err());
    assert!(common::client_with("max_attempts = 11").unwrap().validate().is_err());
    assert!(common::client_with("max_attempts = 10").unwrap().validate().is_ok());
}

#[test]
fn load_reads_file_from_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("client.toml");
    std::fs::write(&path, common::MINIMAL_CLIENT).unwrap();
    let config = ClientConfig::load(Some(&path)).unwrap();
    assert_eq!(config.agent_address, "agent.local:8111");
}
