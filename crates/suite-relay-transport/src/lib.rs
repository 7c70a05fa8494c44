// crates/suite-relay-transport/src/lib.rs
// ============================================================================
// Module: Suite Relay Transport Library
// Description: TLS listener and connector for agent and client.
// Purpose: Provide encrypted, optionally mutually-authenticated channels.
// Dependencies: rustls, tokio, tokio-rustls
// ============================================================================

//! ## Overview
//! The transport layer wraps TCP in TLS. The agent side binds a
//! [`SecureListener`] whose accepted connections report the verified peer
//! identity; the client side dials through a [`SecureConnector`]. There is no
//! plaintext mode.
//!
//! Security posture: peers are untrusted until the handshake completes;
//! protocol versions and cipher suites are the rustls safe defaults.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod connector;
pub mod error;
pub mod listener;
pub mod tls;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use connector::ClientStream;
pub use connector::SecureConnector;
pub use connector::connect;
pub use error::TransportError;
pub use listener::AcceptedConnection;
pub use listener::Incoming;
pub use listener::PeerIdentity;
pub use listener::SecureListener;
pub use listener::ServerStream;
pub use listener::listen;
pub use tls::ClientIdentity;
pub use tls::ClientTlsSettings;
pub use tls::ServerTlsSettings;
