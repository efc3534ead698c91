//! Server identity material and TLS configurations.
//!
//! A server identity is a private CA plus a server certificate signed by it.
//! Clients trust the CA certificate shipped in their configuration; the
//! server presents the leaf certificate, which names the public host (DNS name
//! or IP address) clients dial.

use std::fs;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore, ServerConfig};

use crate::config::write_private;
use crate::error::{Error, Result};
use crate::paths;

fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// PEM encoded identity produced by [`generate_identity`].
pub struct Identity {
    pub ca_cert_pem: String,
    pub server_cert_pem: String,
    pub server_key_pem: String,
}

/// Generates a CA and a server certificate for `host`.
///
/// Both certificates keep rcgen's default validity window, which does not
/// expire in practice.
pub fn generate_identity(host: &str) -> Result<Identity> {
    let ca_key = KeyPair::generate().map_err(cert_error)?;
    let mut ca_params = CertificateParams::new(Vec::<String>::new()).map_err(cert_error)?;
    ca_params.distinguished_name.push(DnType::CommonName, "trustrpc CA");
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::DigitalSignature];
    let ca_cert = ca_params.self_signed(&ca_key).map_err(cert_error)?;

    let server_key = KeyPair::generate().map_err(cert_error)?;
    let mut server_params = CertificateParams::new(vec![host.to_owned()]).map_err(cert_error)?;
    server_params.distinguished_name.push(DnType::CommonName, host);
    server_params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    server_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    let server_cert =
        server_params.signed_by(&server_key, &ca_cert, &ca_key).map_err(cert_error)?;

    Ok(Identity {
        ca_cert_pem: ca_cert.pem(),
        server_cert_pem: server_cert.pem(),
        server_key_pem: server_key.serialize_pem(),
    })
}

/// Generates an identity for `host` and writes it into `base_dir`.
pub fn generate_key_and_cert(base_dir: &Path, host: &str) -> Result<()> {
    let identity = generate_identity(host)?;
    write_private(&paths::server_key_path(base_dir), identity.server_key_pem.as_bytes())?;
    write_private(&paths::server_cert_path(base_dir), identity.server_cert_pem.as_bytes())?;
    write_private(&paths::ca_cert_path(base_dir), identity.ca_cert_pem.as_bytes())?;
    Ok(())
}

/// Reads the CA certificate clients must trust.
pub fn load_ca_cert(base_dir: &Path) -> Result<Vec<u8>> {
    Ok(fs::read(paths::ca_cert_path(base_dir))?)
}

/// Parses every certificate in a PEM bundle.
pub fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Config(format!("cannot parse certificate: {e}")))?;
    if certs.is_empty() {
        return Err(Error::Config("no certificate found".into()));
    }
    Ok(certs)
}

fn parse_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut BufReader::new(pem))
        .map_err(|e| Error::Config(format!("cannot parse private key: {e}")))?
        .ok_or_else(|| Error::Config("no private key found".into()))
}

/// Builds the listener's TLS configuration from the identity in `base_dir`.
pub fn load_server_config(base_dir: &Path) -> Result<Arc<ServerConfig>> {
    let cert_path = paths::server_cert_path(base_dir);
    let key_path = paths::server_key_path(base_dir);
    let certs = parse_certs(&read_identity_file(&cert_path)?)?;
    let key = parse_key(&read_identity_file(&key_path)?)?;

    let config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(Arc::new(config))
}

fn read_identity_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))
}

/// Builds a client TLS configuration trusting only the certificates in `ca_pem`.
pub fn client_config(ca_pem: &[u8]) -> Result<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();
    for cert in parse_certs(ca_pem)? {
        roots
            .add(cert)
            .map_err(|e| Error::Config(format!("cannot add certificate to pool: {e}")))?;
    }

    let config = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Server name to verify for an address of the form `host:port`.
pub fn server_name(addr: &str) -> Result<ServerName<'static>> {
    let host = host_of(addr);
    ServerName::try_from(host.to_owned())
        .map_err(|e| Error::Config(format!("invalid server name {host:?}: {e}")))
}

/// Host part of `host:port`, without IPv6 brackets.
///
/// An address without a port, including an unbracketed IPv6 address, is
/// returned as is.
pub fn host_of(addr: &str) -> &str {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return addr;
    }
    let host = match addr.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => host,
        _ => addr,
    };
    host.trim_start_matches('[').trim_end_matches(']')
}

fn cert_error(e: rcgen::Error) -> Error {
    Error::Config(format!("certificate generation failed: {e}"))
}
