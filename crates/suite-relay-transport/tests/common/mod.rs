// crates/suite-relay-transport/tests/common/mod.rs
// ============================================================================
// Module: TLS Test Fixtures
// Description: Generate ephemeral CA, server, and client certificates.
// Purpose: Avoid committing private keys while enabling TLS/mTLS coverage.
// Dependencies: rcgen, tempfile
// ============================================================================

#![allow(dead_code, reason = "Fixtures are selectively used across suites.")]

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
use suite_relay_transport::ClientIdentity;
use suite_relay_transport::ClientTlsSettings;
use suite_relay_transport::ServerTlsSettings;
use tempfile::TempDir;

/// Paths to generated TLS material.
pub struct TlsFixtures {
    _tempdir: TempDir,
    pub ca_pem: PathBuf,
    pub other_ca_pem: PathBuf,
    pub server_cert: PathBuf,
    pub server_key: PathBuf,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
}

impl TlsFixtures {
    pub fn server(&self, mutual: bool) -> ServerTlsSettings {
        ServerTlsSettings {
            cert_path: self.server_cert.clone(),
            key_path: self.server_key.clone(),
            client_ca_path: mutual.then(|| self.ca_pem.clone()),
        }
    }

    pub fn client(&self, with_identity: bool) -> ClientTlsSettings {
        ClientTlsSettings {
            trust_anchor_path: self.ca_pem.clone(),
            identity: with_identity.then(|| ClientIdentity {
                cert_path: self.client_cert.clone(),
                key_path: self.client_key.clone(),
            }),
            server_name: "localhost".to_string(),
        }
    }
}

pub fn generate() -> Result<TlsFixtures, Box<dyn std::error::Error>> {
    let tempdir = tempfile::Builder::new().prefix("suite-relay-tls").tempdir()?;
    let (ca, issuer) = generate_ca("Suite Relay Test CA")?;
    let (other_ca, _) = generate_ca("Suite Relay Untrusted CA")?;
    let (server, server_key) = generate_leaf(&issuer, true)?;
    let (client, client_key) = generate_leaf(&issuer, false)?;

    let fixtures = TlsFixtures {
        ca_pem: tempdir.path().join("ca.pem"),
        other_ca_pem: tempdir.path().join("other-ca.pem"),
        server_cert: tempdir.path().join("server.pem"),
        server_key: tempdir.path().join("server.key"),
        client_cert: tempdir.path().join("client.pem"),
        client_key: tempdir.path().join("client.key"),
        _tempdir: tempdir,
    };
    fs::write(&fixtures.ca_pem, ca.pem())?;
    fs::write(&fixtures.other_ca_pem, other_ca.pem())?;
    fs::write(&fixtures.server_cert, server.pem())?;
    fs::write(&fixtures.server_key, server_key.serialize_pem())?;
    fs::write(&fixtures.client_cert, client.pem())?;
    fs::write(&fixtures.client_key, client_key.serialize_pem())?;
    Ok(fixtures)
}

fn generate_ca(
    common_name: &str,
) -> Result<(Certificate, Issuer<'static, KeyPair>), Box<dyn std::error::Error>> {
    let key = KeyPair::generate()?;
    let mut params = CertificateParams::default();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.distinguished_name = distinguished_name(common_name);
    let cert = params.self_signed(&key)?;
    Ok((cert, Issuer::new(params, key)))
}

fn generate_leaf(
    issuer: &Issuer<'_, KeyPair>,
    server: bool,
) -> Result<(Certificate, KeyPair), Box<dyn std::error::Error>> {
    let key = KeyPair::generate()?;
    let mut params = if server {
        CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()])?
    } else {
        CertificateParams::default()
    };
    params.distinguished_name =
        distinguished_name(if server { "Suite Relay Agent" } else { "Suite Relay Client" });
    params.is_ca = IsCa::NoCa;
    params.extended_key_usages = vec![if server {
        ExtendedKeyUsagePurpose::ServerAuth
    } else {
        ExtendedKeyUsagePurpose::ClientAuth
    }];
    let cert = params.signed_by(&key, issuer)?;
    Ok((cert, key))
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, common_name);
    name
}
