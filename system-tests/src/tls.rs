// system-tests/src/tls.rs
// ============================================================================
// Module: TLS Fixtures
// Description: Ephemeral CA, agent, and client certificates.
// Purpose: Give each scenario its own trust domain on disk.
// Dependencies: rcgen, tempfile
// ============================================================================

//! ## Overview
//! [`TlsFixtures::generate`] writes a CA, an agent certificate valid for
//! `localhost` and `127.0.0.1`, and a client certificate into a temporary
//! directory that lives as long as the fixture.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::PathBuf;

use rcgen::BasicConstraints;
use rcgen::Certificate;
use rcgen::CertificateParams;
use rcgen::DistinguishedName;
use rcgen::DnType;
use rcgen::ExtendedKeyUsagePurpose;
use rcgen::IsCa;
use rcgen::Issuer;
use rcgen::KeyPair;
use tempfile::TempDir;

/// Boxed error for fixture setup.
pub type FixtureError = Box<dyn std::error::Error + Send + Sync>;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Paths to generated TLS material.
pub struct TlsFixtures {
    /// Keeps the files alive.
    _root: TempDir,
    /// Trusted CA certificate.
    pub ca_pem: PathBuf,
    /// Agent certificate chain.
    pub agent_cert: PathBuf,
    /// Agent private key.
    pub agent_key: PathBuf,
    /// Client certificate chain.
    pub client_cert: PathBuf,
    /// Client private key.
    pub client_key: PathBuf,
}

impl TlsFixtures {
    /// Generates a fresh CA and leaf certificates.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError`] when key generation or file writes fail.
    pub fn generate() -> Result<Self, FixtureError> {
        let root = tempfile::Builder::new().prefix("suite-relay-system-tls").tempdir()?;
        let (ca, issuer) = generate_ca()?;
        let (agent, agent_key) = generate_leaf(&issuer, true)?;
        let (client, client_key) = generate_leaf(&issuer, false)?;
        let fixtures = Self {
            ca_pem: root.path().join("ca.pem"),
            agent_cert: root.path().join("agent.pem"),
            agent_key: root.path().join("agent.key"),
            client_cert: root.path().join("client.pem"),
            client_key: root.path().join("client.key"),
            _root: root,
        };
        fs::write(&fixtures.ca_pem, ca.pem())?;
        fs::write(&fixtures.agent_cert, agent.pem())?;
        fs::write(&fixtures.agent_key, agent_key.serialize_pem())?;
        fs::write(&fixtures.client_cert, client.pem())?;
        fs::write(&fixtures.client_key, client_key.serialize_pem())?;
        Ok(fixtures)
    }
}

// ============================================================================
// SECTION: Generation
// ============================================================================

/// Creates a self-signed CA.
fn generate_ca() -> Result<(Certificate, Issuer<'static, KeyPair>), FixtureError> {
    let key = KeyPair::generate()?;
    let mut params = CertificateParams::default();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.distinguished_name = common_name("Suite Relay System CA");
    let cert = params.self_signed(&key)?;
    Ok((cert, Issuer::new(params, key)))
}

/// Creates a leaf certificate signed by `issuer`.
fn generate_leaf(
    issuer: &Issuer<'_, KeyPair>,
    agent: bool,
) -> Result<(Certificate, KeyPair), FixtureError> {
    let key = KeyPair::generate()?;
    let mut params = if agent {
        CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()])?
    } else {
        CertificateParams::default()
    };
    params.distinguished_name =
        common_name(if agent { "Suite Relay System Agent" } else { "Suite Relay System Client" });
    params.is_ca = IsCa::NoCa;
    params.extended_key_usages = vec![if agent {
        ExtendedKeyUsagePurpose::ServerAuth
    } else {
        ExtendedKeyUsagePurpose::ClientAuth
    }];
    let cert = params.signed_by(&key, issuer)?;
    Ok((cert, key))
}

/// Builds a distinguished name with only a common name.
fn common_name(value: &str) -> DistinguishedName {
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, value);
    name
}
