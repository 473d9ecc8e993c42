//! This relay's long-term RSA identity key: load-or-generate from disk,
//! plus a self-signed TLS certificate for the inbound OR-port listener
//! that embeds that same key.
//!
//! The embedding matters because `orcore-chanmgr`'s outbound dialer
//! (`connector::identity_from_cert`) fingerprints a peer's identity
//! straight from the SubjectPublicKeyInfo of whatever certificate it
//! presents, without validating the certificate's signature chain at
//! all (`AcceptAnyCert`). For another relay's dial into *this* relay to
//! observe the right identity, the cert this listener presents has to
//! carry the relay's real onion-handshake key, not an unrelated
//! TLS-only one.

use std::path::Path;

use orcore_llcrypto::pk::rsa::{generate_identity_keypair, KeyPair as IdentityKeyPair, RsaIdentity};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::EncodePublicKey;
use rsa::RsaPrivateKey;
use signature::{SignatureEncoding, Signer};

use crate::err::{Error, Result};

/// Load this relay's identity key from `path`, generating and persisting
/// a fresh one if the file doesn't exist yet.
pub fn load_or_generate(path: &Path) -> Result<IdentityKeyPair> {
    match std::fs::read(path) {
        Ok(der) => {
            let private = RsaPrivateKey::from_pkcs1_der(&der)
                .map_err(|e| Error::Identity(format!("parsing {}: {e}", path.display())))?;
            IdentityKeyPair::from_private_key(private)
                .map_err(|e| Error::Identity(format!("rejecting key from {}: {e}", path.display())))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let keypair = generate_identity_keypair(&mut OsRng)
                .map_err(|e| Error::Identity(format!("generating identity key: {e}")))?;
            let der = keypair
                .private_key()
                .to_pkcs1_der()
                .map_err(|e| Error::Identity(format!("encoding generated key: {e}")))?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::Identity(format!("creating {}: {e}", parent.display())))?;
            }
            std::fs::write(path, der.as_bytes())
                .map_err(|e| Error::Identity(format!("writing {}: {e}", path.display())))?;
            Ok(keypair)
        }
        Err(e) => Err(Error::Identity(format!("reading {}: {e}", path.display()))),
    }
}

/// Build a self-signed TLS certificate (and matching `rcgen` key pair)
/// for the OR-port listener, embedding `identity`'s public key.
pub fn self_signed_or_cert(identity: &IdentityKeyPair) -> Result<(rcgen::Certificate, rcgen::KeyPair)> {
    let signer = RsaRemoteSigner {
        private_key: identity.private_key().clone(),
    };
    let key_pair = rcgen::KeyPair::from_remote(Box::new(signer))
        .map_err(|e| Error::Identity(format!("wrapping identity key for rcgen: {e}")))?;

    let mut params = rcgen::CertificateParams::default();
    let mut dn = rcgen::DistinguishedName::new();
    dn.push(rcgen::DnType::CommonName, "orcore-relay");
    params.distinguished_name = dn;
    params.not_before = time::OffsetDateTime::UNIX_EPOCH;
    params.not_after = time::OffsetDateTime::UNIX_EPOCH + time::Duration::days(365 * 20);

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| Error::Identity(format!("building OR-port certificate: {e}")))?;
    Ok((cert, key_pair))
}

/// Fingerprint an identity keypair the same way a peer observing our
/// certificate over the wire would, for logging at startup.
pub fn fingerprint(identity: &IdentityKeyPair) -> RsaIdentity {
    identity.identity()
}

/// Wraps an `rsa::RsaPrivateKey` as an `rcgen` remote signer so `rcgen`
/// can build a normal X.509 structure around our RSA identity key
/// without us hand-rolling `TbsCertificate` DER.
struct RsaRemoteSigner {
    private_key: RsaPrivateKey,
}

impl rcgen::RemoteKeyPair for RsaRemoteSigner {
    fn public_key(&self) -> &[u8] {
        // `rcgen::RemoteKeyPair` wants the SubjectPublicKeyInfo DER; we
        // can't return a borrow of a temporary, so this leaks once per
        // listener startup, which only happens a handful of times per
        // process lifetime.
        let der = self
            .private_key
            .to_public_key()
            .to_public_key_der()
            .expect("RSA public key should always encode to DER");
        Box::leak(der.into_vec().into_boxed_slice())
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, rcgen::Error> {
        let signing_key = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(self.private_key.clone());
        let signature = signing_key.try_sign(msg).map_err(|_| rcgen::Error::RemoteKeyError)?;
        Ok(signature.to_vec())
    }

    fn algorithm(&self) -> &'static rcgen::SignatureAlgorithm {
        &rcgen::PKCS_RSA_SHA256
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn load_or_generate_persists_across_loads() {
        let dir = std::env::temp_dir().join(format!("orcore-relay-identity-test-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("identity.rsa.der");
        let _ = std::fs::remove_file(&path);

        let first = load_or_generate(&path).unwrap();
        let second = load_or_generate(&path).unwrap();
        assert_eq!(first.identity(), second.identity());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn self_signed_cert_builds() {
        let keypair = generate_identity_keypair(&mut OsRng).unwrap();
        let (cert, _rcgen_keypair) = self_signed_or_cert(&keypair).unwrap();
        assert!(!cert.der().is_empty());
    }
}
