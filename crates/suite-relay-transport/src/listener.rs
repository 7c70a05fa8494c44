// crates/suite-relay-transport/src/listener.rs
// ============================================================================
// Module: Secure Listener
// Description: TLS listener with deferred per-connection handshakes.
// Purpose: Accept agent connections and report verified peer identities.
// Dependencies: rustls, tokio, tokio-rustls, suite-relay-core
// ============================================================================

//! ## Overview
//! [`SecureListener::accept`] returns as soon as TCP is accepted; the TLS
//! handshake runs in [`Incoming::handshake`] so a slow peer never stalls the
//! accept loop. Handshakes are bounded by a timeout.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use rustls_pki_types::CertificateDer;
use suite_relay_core::hashing::checksum;
use suite_relay_core::hashing::hex_encode;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;

use crate::error::TransportError;
use crate::tls::ServerTlsSettings;
use crate::tls::server_config;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default bound on a server-side TLS handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// TLS stream produced by a completed server handshake.
pub type ServerStream = tokio_rustls::server::TlsStream<TcpStream>;

// ============================================================================
// SECTION: Peer Identity
// ============================================================================

/// Verified identity of a connected peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerIdentity {
    /// Mutual TLS is disabled; the peer presented no certificate.
    Anonymous,
    /// Peer presented a verified certificate.
    Certificate {
        /// Lowercase hex SHA-256 of the leaf certificate DER.
        fingerprint: String,
    },
}

impl PeerIdentity {
    /// Derives the identity from the peer's certificate chain.
    fn from_chain(chain: Option<&[CertificateDer<'_>]>) -> Self {
        match chain.and_then(|certs| certs.first()) {
            Some(leaf) => Self::Certificate {
                fingerprint: hex_encode(&checksum(leaf.as_ref())),
            },
            None => Self::Anonymous,
        }
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::Certificate {
                fingerprint,
            } => write!(f, "sha256:{fingerprint}"),
        }
    }
}

// ============================================================================
// SECTION: Listener
// ============================================================================

/// TLS listener bound to a local address.
pub struct SecureListener {
    /// Underlying TCP listener.
    tcp: TcpListener,
    /// TLS acceptor sharing the server configuration.
    acceptor: TlsAcceptor,
    /// Whether client certificates are required.
    mutual_tls: bool,
    /// Bound on each handshake.
    handshake_timeout: Duration,
}

impl SecureListener {
    /// Builds the TLS configuration and binds the address.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Configuration`] for bad TLS material and
    /// [`TransportError::Bind`] when the address is unavailable.
    pub async fn bind(
        address: SocketAddr,
        settings: &ServerTlsSettings,
    ) -> Result<Self, TransportError> {
        let config = server_config(settings)?;
        let tcp = TcpListener::bind(address)
            .await
            .map_err(|err| TransportError::Bind(format!("{address}: {err}")))?;
        Ok(Self {
            tcp,
            acceptor: TlsAcceptor::from(config),
            mutual_tls: settings.client_ca_path.is_some(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        })
    }

    /// Overrides the handshake timeout.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Returns the bound local address.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] when the socket cannot report it.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.tcp.local_addr().map_err(|err| TransportError::Io(err.to_string()))
    }

    /// Returns true when client certificates are required.
    #[must_use]
    pub const fn mutual_tls(&self) -> bool {
        self.mutual_tls
    }

    /// Accepts the next TCP connection without handshaking.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] when accept fails.
    pub async fn accept(&self) -> Result<Incoming, TransportError> {
        let (tcp, peer_addr) =
            self.tcp.accept().await.map_err(|err| TransportError::Io(err.to_string()))?;
        Ok(Incoming {
            tcp,
            peer_addr,
            acceptor: self.acceptor.clone(),
            handshake_timeout: self.handshake_timeout,
        })
    }
}

/// Binds a TLS listener; see [`SecureListener::bind`].
///
/// # Errors
///
/// Returns [`TransportError`] as described on [`SecureListener::bind`].
pub async fn listen(
    address: SocketAddr,
    settings: &ServerTlsSettings,
) -> Result<SecureListener, TransportError> {
    SecureListener::bind(address, settings).await
}

// ============================================================================
// SECTION: Incoming Connections
// ============================================================================

/// Accepted TCP connection awaiting its TLS handshake.
pub struct Incoming {
    /// Raw TCP stream.
    tcp: TcpStream,
    /// Remote address.
    peer_addr: SocketAddr,
    /// TLS acceptor.
    acceptor: TlsAcceptor,
    /// Bound on the handshake.
    handshake_timeout: Duration,
}

impl Incoming {
    /// Returns the remote address.
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Completes the TLS handshake.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Handshake`] when the peer fails verification
    /// or the handshake times out.
    pub async fn handshake(self) -> Result<AcceptedConnection, TransportError> {
        let peer_addr = self.peer_addr;
        let stream =
            tokio::time::timeout(self.handshake_timeout, self.acceptor.accept(self.tcp))
                .await
                .map_err(|_| TransportError::Handshake(format!("{peer_addr}: handshake timed out")))?
                .map_err(|err| TransportError::Handshake(format!("{peer_addr}: {err}")))?;
        let identity = PeerIdentity::from_chain(stream.get_ref().1.peer_certificates());
        Ok(AcceptedConnection {
            stream,
            peer_addr,
            identity,
        })
    }
}

/// Connection that completed the TLS handshake.
pub struct AcceptedConnection {
    /// Encrypted stream.
    pub stream: ServerStream,
    /// Remote address.
    pub peer_addr: SocketAddr,
    /// Verified peer identity.
    pub identity: PeerIdentity,
}

// ============================================================================
// SECTION: Tests
// ============================================================================
