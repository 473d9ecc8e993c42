//! Dialing a peer and turning the resulting TLS session into a pinned
//! [`orcore_proto::Channel`] (spec §4.C).
//!
//! Mutual authentication here proves control of an identity key, not
//! membership in any trust anchor: we accept any certificate the peer
//! presents and derive its identity from the certified public key
//! ourselves, exactly as spec §4.C describes, rather than asking rustls
//! to validate the chain against a root store.

use crate::err::{Error, Result};
use orcore_llcrypto::pk::rsa::RsaIdentity;
use rsa::pkcs8::DecodePublicKey;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, IpAddr as RustlsIpAddr, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::net::Ipv4Addr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate;

/// A TLS-wrapped OR-link connection, ready to be framed as an
/// [`orcore_proto::Channel`].
pub type OrStream = TlsStream<TcpStream>;

/// Where to dial: the target's address, port, and (if known) the
/// identity we expect to find there.
#[derive(Clone, Copy, Debug)]
pub struct LinkTarget {
    /// The peer's address.
    pub addr: Ipv4Addr,
    /// The peer's OR port.
    pub or_port: u16,
    /// The identity we're dialing to reach, if we already know it (unset
    /// only when accepting an inbound connection, which this connector
    /// doesn't handle).
    pub expected_identity: Option<RsaIdentity>,
}

/// Verifier that accepts any certificate chain: identity comes from the
/// certified key afterward, not from chain-of-trust validation.
#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
        ]
    }
}

fn client_config() -> Arc<ClientConfig> {
    static CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    CONFIG
        .get_or_init(|| {
            let mut config = ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
                .with_no_client_auth();
            config.enable_sni = false;
            Arc::new(config)
        })
        .clone()
}

/// Dial `target`, complete TLS, and extract the peer's identity from its
/// leaf certificate's public key. Returns the open TLS stream and the
/// observed identity; the caller still has to wrap it as a `Channel` and
/// pin the identity (spec §4.C separates "link open" from "identity
/// pinned" as distinct states).
pub async fn dial(target: LinkTarget, connect_timeout: Duration) -> Result<(OrStream, RsaIdentity)> {
    let fut = dial_inner(target);
    match tokio::time::timeout(connect_timeout, fut).await {
        Ok(r) => r,
        Err(_) => Err(Error::Timeout(
            target.expected_identity.unwrap_or_else(|| RsaIdentity::from_bytes(&[0; 20]).expect("20 bytes")),
        )),
    }
}

async fn dial_inner(target: LinkTarget) -> Result<(OrStream, RsaIdentity)> {
    let placeholder_id = || target.expected_identity.unwrap_or_else(|| RsaIdentity::from_bytes(&[0; 20]).expect("20 bytes"));

    let tcp = TcpStream::connect((target.addr, target.or_port))
        .await
        .map_err(|e| Error::Connect(placeholder_id(), Arc::new(e)))?;
    tcp.set_nodelay(true).map_err(|e| Error::Connect(placeholder_id(), Arc::new(e)))?;

    let connector = TlsConnector::from(client_config());
    let server_name = ServerName::IpAddress(RustlsIpAddr::from(std::net::IpAddr::V4(target.addr)));
    let tls = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| Error::Connect(placeholder_id(), Arc::new(e)))?;

    let identity = {
        let (_io, conn) = tls.get_ref();
        let certs = conn
            .peer_certificates()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Connect(placeholder_id(), Arc::new(std::io::Error::new(std::io::ErrorKind::InvalidData, "peer presented no certificate"))))?;
        identity_from_cert(&certs[0]).map_err(|e| Error::Connect(placeholder_id(), Arc::new(e)))?
    };

    Ok((tls, identity))
}

/// Extract a peer's identity from its leaf certificate's public key.
/// Exposed for the relay's inbound OR-port listener, which has to derive
/// a dialing peer's identity from its TLS client certificate the exact
/// same way this module derives a dialed peer's identity from its
/// server certificate.
pub fn identity_from_cert(der_bytes: &CertificateDer<'_>) -> std::result::Result<RsaIdentity, std::io::Error> {
    let bad = |msg: &str| std::io::Error::new(std::io::ErrorKind::InvalidData, msg.to_string());

    let cert = Certificate::from_der(der_bytes.as_ref()).map_err(|_| bad("malformed X.509 certificate"))?;
    let spki_der = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|_| bad("malformed SubjectPublicKeyInfo"))?;
    let pubkey = rsa::RsaPublicKey::from_public_key_der(&spki_der).map_err(|_| bad("certificate key is not RSA"))?;
    RsaIdentity::from_public_key(&pubkey).map_err(|_| bad("failed to fingerprint certificate key"))
}

