//! Inbound OR-port: accept TLS connections, demand (but do not chain-
//! validate) a client certificate, derive the dialing peer's identity
//! from it exactly as `orcore-chanmgr`'s own dialer derives a dialed
//! peer's identity from its server certificate, then hand the link to
//! the `VERSIONS`/`NETINFO` exchange and the shared reactor.
//!
//! Grounded on `orcore-chanmgr::connector`'s `AcceptAnyCert`: that
//! verifier accepts any certificate chain when *dialing out* because
//! identity here isn't a chain-of-trust property, it's
//! "whichever key this peer can prove it holds". The same argument
//! applies symmetrically to accepting a client certificate, so this
//! listener's verifier is `AcceptAnyCert`'s mirror image rather than a
//! new trust model — there's no pack precedent for rustls's client-auth
//! API specifically, so this is built directly against `rustls`' own
//! `ClientCertVerifier` trait.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use orcore_chanmgr::connector::identity_from_cert;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::server::WebPkiClientVerifier;
use rustls::{DigitallySignedStruct, DistinguishedName, RootCertStore, ServerConfig, SignatureScheme};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

use crate::err::{Error, Result};
use crate::relay::RelayContext;

/// Verifier that requires *a* client certificate but never validates its
/// chain: identity comes from the certified key afterward, the same
/// division of labor `AcceptAnyCert` uses for the dial side.
#[derive(Debug)]
struct AcceptAnyClientCert {
    inner: Arc<dyn ClientCertVerifier>,
}

impl AcceptAnyClientCert {
    fn new() -> Result<Self> {
        // `WebPkiClientVerifier` needs *some* root store to construct,
        // even though `verify_client_cert` below never consults it; an
        // empty store is fine since chain validation never happens.
        let inner = WebPkiClientVerifier::builder(Arc::new(RootCertStore::empty()))
            .allow_unauthenticated()
            .build()
            .map_err(|e| Error::Identity(format!("building client verifier scaffold: {e}")))?;
        Ok(AcceptAnyClientCert { inner })
    }
}

impl ClientCertVerifier for AcceptAnyClientCert {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        true
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> std::result::Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
        ]
    }
}

fn server_config(ctx: &Arc<RelayContext>) -> Result<Arc<ServerConfig>> {
    let (cert, _rcgen_key) = crate::identity::self_signed_or_cert(&ctx.identity)?;
    let cert_der = CertificateDer::from(cert.der().to_vec());

    let private_der = ctx
        .identity
        .private_key()
        .to_pkcs1_der()
        .map_err(|e| Error::Identity(format!("encoding identity key for TLS: {e}")))?;
    let key_der = PrivateKeyDer::Pkcs1(private_der.as_bytes().to_vec().into());

    let verifier = AcceptAnyClientCert::new()?;
    let config = ServerConfig::builder()
        .with_client_cert_verifier(Arc::new(verifier))
        .with_single_cert(vec![cert_der], key_der)
        .map_err(|e| Error::Identity(format!("building OR-port TLS config: {e}")))?;
    Ok(Arc::new(config))
}

/// Run the OR-port accept loop until the listener socket itself fails.
pub async fn serve(ctx: Arc<RelayContext>) -> Result<()> {
    let config = server_config(&ctx)?;
    let acceptor = TlsAcceptor::from(config);

    let listener = TcpListener::bind(ctx.config.or_listen)
        .await
        .map_err(|e| Error::Listen(Arc::new(e)))?;
    debug!(addr = %ctx.config.or_listen, "OR-port listening");

    loop {
        let (tcp, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "OR-port accept failed");
                continue;
            }
        };
        let _ = tcp.set_nodelay(true);

        let ctx = ctx.clone();
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            if let Err(e) = accept_one(ctx, acceptor, tcp, peer_addr.ip()).await {
                warn!(peer = %peer_addr, error = %e, "inbound OR-link setup failed");
            }
        });
    }
}

async fn accept_one(
    ctx: Arc<RelayContext>,
    acceptor: TlsAcceptor,
    tcp: tokio::net::TcpStream,
    peer_ip: std::net::IpAddr,
) -> Result<()> {
    let tls = acceptor.accept(tcp).await.map_err(|e| Error::Listen(Arc::new(e)))?;

    let identity = {
        let (_io, conn) = tls.get_ref();
        let certs = conn
            .peer_certificates()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Identity("inbound OR-link presented no client certificate".into()))?;
        identity_from_cert(&certs[0]).map_err(|e| Error::Identity(format!("fingerprinting client cert: {e}")))?
    };

    let peer_v4 = match peer_ip {
        std::net::IpAddr::V4(v4) => v4,
        std::net::IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
    };

    let now = Instant::now();
    let mut channel =
        orcore_proto::Channel::new(tls, ctx.config.bandwidth_rate, ctx.config.bandwidth_burst, now);
    channel.pin_identity(identity, None).map_err(Error::Proto)?;

    let my_addrs = vec![match ctx.config.or_listen.ip() {
        std::net::IpAddr::V4(v4) => v4,
        std::net::IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
    }];
    orcore_proto::linkhandshake::run(&mut channel, peer_v4, my_addrs, now)
        .await
        .map_err(Error::Proto)?;

    debug!(peer = %identity, "inbound OR-link established");
    let shared: orcore_chanmgr::SharedChannel = Arc::new(tokio::sync::Mutex::new(channel));
    ctx.ensure_link_reactor(identity, shared).await;
    Ok(())
}
