// crates/suite-relay-transport/src/tls.rs
// ============================================================================
// Module: TLS Configuration
// Description: PEM loading and rustls server/client configuration builders.
// Purpose: Turn certificate paths into fail-closed rustls configurations.
// Dependencies: rustls, rustls-pki-types
// ============================================================================

//! ## Overview
//! Certificates and keys are consumed as PEM file paths. A server configured
//! with a client CA bundle requires and verifies client certificates; without
//! one it serves any client that trusts its certificate. Both sides use the
//! aws-lc-rs provider with the rustls safe default protocol versions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls::ServerConfig;
use rustls::crypto::CryptoProvider;
use rustls::server::WebPkiClientVerifier;
use rustls_pki_types::CertificateDer;
use rustls_pki_types::PrivateKeyDer;
use rustls_pki_types::pem::PemObject;

use crate::error::TransportError;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Server-side TLS material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTlsSettings {
    /// Server certificate chain (PEM).
    pub cert_path: PathBuf,
    /// Server private key (PEM).
    pub key_path: PathBuf,
    /// Client CA bundle (PEM); enables mutual TLS when set.
    pub client_ca_path: Option<PathBuf>,
}

/// Client certificate and key used for mutual TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Client certificate chain (PEM).
    pub cert_path: PathBuf,
    /// Client private key (PEM).
    pub key_path: PathBuf,
}

/// Client-side TLS material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientTlsSettings {
    /// CA bundle (PEM) the server certificate must chain to.
    pub trust_anchor_path: PathBuf,
    /// Optional client identity.
    pub identity: Option<ClientIdentity>,
    /// Name the server certificate must be valid for.
    pub server_name: String,
}

// ============================================================================
// SECTION: PEM Loading
// ============================================================================

/// Loads every certificate from a PEM file.
///
/// # Errors
///
/// Returns [`TransportError::Configuration`] when the file is unreadable,
/// malformed, or contains no certificates.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let certs = CertificateDer::pem_file_iter(path)
        .map_err(|err| pem_error("certificates", path, &err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| pem_error("certificates", path, &err))?;
    if certs.is_empty() {
        return Err(TransportError::Configuration(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Loads the first private key from a PEM file.
///
/// # Errors
///
/// Returns [`TransportError::Configuration`] when the file is unreadable or
/// contains no private key.
pub fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TransportError> {
    PrivateKeyDer::from_pem_file(path).map_err(|err| pem_error("private key", path, &err))
}

/// Loads a PEM bundle into a root store.
fn load_roots(path: &Path) -> Result<RootCertStore, TransportError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots.add(cert).map_err(|err| {
            TransportError::Configuration(format!(
                "invalid trust anchor in {}: {err}",
                path.display()
            ))
        })?;
    }
    Ok(roots)
}

/// Formats a PEM loading failure.
fn pem_error(what: &str, path: &Path, err: &impl std::fmt::Display) -> TransportError {
    TransportError::Configuration(format!("failed to read {what} from {}: {err}", path.display()))
}

/// Returns the crypto provider shared by both sides.
fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

// ============================================================================
// SECTION: Config Builders
// ============================================================================

/// Builds the agent's rustls configuration.
///
/// # Errors
///
/// Returns [`TransportError::Configuration`] when material is unreadable,
/// empty, or the key does not match the certificate.
pub fn server_config(settings: &ServerTlsSettings) -> Result<Arc<ServerConfig>, TransportError> {
    let provider = crypto_provider();
    let certs = load_certs(&settings.cert_path)?;
    let key = load_key(&settings.key_path)?;
    let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|err| TransportError::Configuration(err.to_string()))?;
    let builder = match &settings.client_ca_path {
        Some(path) => {
            let roots = load_roots(path)?;
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()
                .map_err(|err| {
                    TransportError::Configuration(format!("client verifier: {err}"))
                })?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };
    let config = builder.with_single_cert(certs, key).map_err(|err| {
        TransportError::Configuration(format!("server certificate and key rejected: {err}"))
    })?;
    Ok(Arc::new(config))
}

/// Builds the client's rustls configuration.
///
/// # Errors
///
/// Returns [`TransportError::Configuration`] when material is unreadable,
/// empty, or the client key does not match its certificate.
pub fn client_config(settings: &ClientTlsSettings) -> Result<Arc<ClientConfig>, TransportError> {
    let roots = load_roots(&settings.trust_anchor_path)?;
    let builder = ClientConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|err| TransportError::Configuration(err.to_string()))?
        .with_root_certificates(roots);
    let config = match &settings.identity {
        Some(identity) => {
            let certs = load_certs(&identity.cert_path)?;
            let key = load_key(&identity.key_path)?;
            builder.with_client_auth_cert(certs, key).map_err(|err| {
                TransportError::Configuration(format!("client certificate and key rejected: {err}"))
            })?
        }
        None => builder.with_no_client_auth(),
    };
    Ok(Arc::new(config))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only configuration assertions."
    )]

    use super::*;

    #[test]
    fn missing_certificate_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_certs(&dir.path().join("absent.pem")).unwrap_err();
        assert!(matches!(err, TransportError::Configuration(_)));
    }

    #[test]
    fn empty_certificate_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pem");
        std::fs::write(&path, b"").unwrap();
        let err = load_certs(&path).unwrap_err();
        assert!(err.to_string().contains("no certificates"));
    }

    #[test]
    fn file_without_key_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nokey.pem");
        std::fs::write(&path, b"not a key").unwrap();
        assert!(matches!(load_key(&path), Err(TransportError::Configuration(_))));
    }
}
