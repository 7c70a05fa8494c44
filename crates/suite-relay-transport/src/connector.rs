// crates/suite-relay-transport/src/connector.rs
// ============================================================================
// Module: Secure Connector
// Description: TLS client connector verifying the agent certificate.
// Purpose: Dial the agent and classify connect versus handshake failures.
// Dependencies: rustls, tokio, tokio-rustls
// ============================================================================

//! ## Overview
//! A [`SecureConnector`] is built once from client settings and reused for
//! every attempt, so retries share trust material and the server name.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use rustls_pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::error::TransportError;
use crate::tls::ClientTlsSettings;
use crate::tls::client_config;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default bound on TCP connect plus TLS handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// TLS stream produced by a completed client handshake.
pub type ClientStream = tokio_rustls::client::TlsStream<TcpStream>;

// ============================================================================
// SECTION: Connector
// ============================================================================

/// Reusable TLS connector.
#[derive(Clone)]
pub struct SecureConnector {
    /// TLS connector sharing the client configuration.
    connector: TlsConnector,
    /// Name the server certificate must match.
    server_name: ServerName<'static>,
    /// Bound on connect and handshake.
    connect_timeout: Duration,
}

impl SecureConnector {
    /// Builds a connector from client settings.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Configuration`] for bad TLS material or an
    /// invalid server name.
    pub fn new(settings: &ClientTlsSettings) -> Result<Self, TransportError> {
        let config = client_config(settings)?;
        let server_name = ServerName::try_from(settings.server_name.clone()).map_err(|err| {
            TransportError::Configuration(format!(
                "invalid server name {:?}: {err}",
                settings.server_name
            ))
        })?;
        Ok(Self {
            connector: TlsConnector::from(config),
            server_name,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    /// Overrides the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Connects to `address` (`host:port`) and completes the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] on network failures and
    /// [`TransportError::Handshake`] when certificate validation fails.
    pub async fn connect(&self, address: &str) -> Result<ClientStream, TransportError> {
        let tcp = tokio::time::timeout(self.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| TransportError::Connect(format!("{address}: connect timed out")))?
            .map_err(|err| TransportError::Connect(format!("{address}: {err}")))?;
        tokio::time::timeout(
            self.connect_timeout,
            self.connector.connect(self.server_name.clone(), tcp),
        )
        .await
        .map_err(|_| TransportError::Handshake(format!("{address}: handshake timed out")))?
        .map_err(|err| TransportError::Handshake(format!("{address}: {err}")))
    }
}

/// Connects once with fresh settings; see [`SecureConnector::connect`].
///
/// # Errors
///
/// Returns [`TransportError`] as described on [`SecureConnector::new`] and
/// [`SecureConnector::connect`].
pub async fn connect(
    address: &str,
    settings: &ClientTlsSettings,
) -> Result<ClientStream, TransportError> {
    SecureConnector::new(settings)?.connect(address).await
}
