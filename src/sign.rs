//! Signing keys for appending signatures to metadata.

use crate::schema::error::{self, Result};
use crate::schema::key::Key;
use crate::schema::spki;
use ring::rand::SecureRandom;
use ring::signature::{EcdsaKeyPair, Ed25519KeyPair, KeyPair, RsaKeyPair};
use snafu::ResultExt;

/// This trait must be implemented for each type of key with which you will
/// sign things.
pub trait Sign: Sync + Send {
    /// Returns the public key as a metadata key record, with its scheme and
    /// other metadata.
    fn tuf_key(&self) -> Key;

    /// Signs the supplied message.
    fn sign(&self, msg: &[u8], rng: &dyn SecureRandom) -> Result<Vec<u8>>;
}

/// Implements the Sign trait for Ed25519 keypairs.
impl Sign for Ed25519KeyPair {
    fn tuf_key(&self) -> Key {
        Key::ed25519(hex::encode(self.public_key().as_ref()))
    }

    fn sign(&self, msg: &[u8], _rng: &dyn SecureRandom) -> Result<Vec<u8>> {
        let signature = Ed25519KeyPair::sign(self, msg);
        Ok(signature.as_ref().to_vec())
    }
}

/// Implements the Sign trait for ECDSA P-256 keypairs.
impl Sign for EcdsaKeyPair {
    fn tuf_key(&self) -> Key {
        Key::ecdsa(spki::encode(
            spki::OID_EC_PUBLIC_KEY,
            &spki::Params::Oid(spki::OID_NISTP256),
            self.public_key().as_ref(),
        ))
    }

    fn sign(&self, msg: &[u8], rng: &dyn SecureRandom) -> Result<Vec<u8>> {
        let signature = EcdsaKeyPair::sign(self, rng, msg).context(error::SignSnafu)?;
        Ok(signature.as_ref().to_vec())
    }
}

/// Implements the Sign trait for RSA keypairs.
impl Sign for RsaKeyPair {
    fn tuf_key(&self) -> Key {
        Key::rsa(spki::encode(
            spki::OID_RSA_ENCRYPTION,
            &spki::Params::Null,
            self.public_key().as_ref(),
        ))
    }

    fn sign(&self, msg: &[u8], rng: &dyn SecureRandom) -> Result<Vec<u8>> {
        let mut signature = vec![0; self.public_modulus_len()];
        RsaKeyPair::sign(self, &ring::signature::RSA_PSS_SHA256, rng, msg, &mut signature)
            .context(error::SignSnafu)?;
        Ok(signature)
    }
}

/// Parses a supplied PEM-encoded keypair and, if it is recognized, returns an
/// object that implements the Sign trait.
pub fn parse_keypair(key: &[u8]) -> Result<Box<dyn Sign>> {
    let pem = pem::parse(key).context(error::PemParseSnafu)?;
    match pem.tag.as_str() {
        "PRIVATE KEY" => {
            if let Ok(ed25519) = Ed25519KeyPair::from_pkcs8(&pem.contents) {
                Ok(Box::new(ed25519))
            } else if let Ok(ecdsa) = EcdsaKeyPair::from_pkcs8(
                &ring::signature::ECDSA_P256_SHA256_ASN1_SIGNING,
                &pem.contents,
            ) {
                Ok(Box::new(ecdsa))
            } else if let Ok(rsa) = RsaKeyPair::from_pkcs8(&pem.contents) {
                Ok(Box::new(rsa))
            } else {
                error::KeyUnrecognizedSnafu.fail()
            }
        }
        "RSA PRIVATE KEY" => Ok(Box::new(
            RsaKeyPair::from_der(&pem.contents).context(error::KeyRejectedSnafu)?,
        )),
        _ => error::KeyUnrecognizedSnafu.fail(),
    }
}
