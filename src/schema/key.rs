//! Public keys as they appear in root metadata and delegations.

use crate::schema::decoded::{Decoded, Hex};
use crate::schema::error::{self, Result};
use crate::schema::spki;
use olpc_cjson::CanonicalFormatter;
use ring::digest::{digest, SHA256};
use ring::signature::{self, VerificationAlgorithm};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::ResultExt;
use std::collections::HashMap;
use std::sync::OnceLock;

/// The `rsa` key type.
pub const KEY_TYPE_RSA: &str = "rsa";
/// The `ed25519` key type.
pub const KEY_TYPE_ED25519: &str = "ed25519";
/// The `ecdsa` key type.
pub const KEY_TYPE_ECDSA: &str = "ecdsa";

/// The `rsassa-pss-sha256` signature scheme.
pub const SCHEME_RSASSA_PSS_SHA256: &str = "rsassa-pss-sha256";
/// The `ed25519` signature scheme.
pub const SCHEME_ED25519: &str = "ed25519";
/// The `ecdsa-sha2-nistp256` signature scheme.
pub const SCHEME_ECDSA_SHA2_NISTP256: &str = "ecdsa-sha2-nistp256";

/// A public key belonging to a role.
///
/// The key ID is the SHA-256 digest of the canonical JSON form of the key
/// record. It is computed lazily, at most once.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Key {
    /// The key type, e.g. `rsa`, `ed25519`, or `ecdsa`.
    pub keytype: String,

    /// The signature scheme the key is used with, e.g. `rsassa-pss-sha256`.
    pub scheme: String,

    /// The public key material.
    pub keyval: KeyVal,

    /// Extra arguments found during deserialization.
    ///
    /// We must store these to correctly calculate the key ID for this object.
    ///
    /// If you're instantiating this struct, you should make this `HashMap::new()`.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,

    #[serde(skip)]
    id: OnceLock<Decoded<Hex>>,
}

/// The value portion of a [`Key`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct KeyVal {
    /// The encoded public key: a PEM `SubjectPublicKeyInfo` document for RSA
    /// and ECDSA keys, a hex string for Ed25519 keys.
    pub public: String,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        // The cached key ID is derived state and does not participate.
        self.keytype == other.keytype
            && self.scheme == other.scheme
            && self.keyval == other.keyval
            && self._extra == other._extra
    }
}

impl Key {
    /// Creates a key record from its parts.
    pub fn new<T, S, P>(keytype: T, scheme: S, public: P) -> Self
    where
        T: Into<String>,
        S: Into<String>,
        P: Into<String>,
    {
        Self {
            keytype: keytype.into(),
            scheme: scheme.into(),
            keyval: KeyVal {
                public: public.into(),
                _extra: HashMap::new(),
            },
            _extra: HashMap::new(),
            id: OnceLock::new(),
        }
    }

    /// Creates an `ed25519` key record from a hex-encoded public key.
    pub fn ed25519<P: Into<String>>(public: P) -> Self {
        Self::new(KEY_TYPE_ED25519, SCHEME_ED25519, public)
    }

    /// Creates an `rsa` key record from a PEM `SubjectPublicKeyInfo` document.
    pub fn rsa<P: Into<String>>(public: P) -> Self {
        Self::new(KEY_TYPE_RSA, SCHEME_RSASSA_PSS_SHA256, public)
    }

    /// Creates an `ecdsa` key record from a PEM `SubjectPublicKeyInfo` document.
    pub fn ecdsa<P: Into<String>>(public: P) -> Self {
        Self::new(KEY_TYPE_ECDSA, SCHEME_ECDSA_SHA2_NISTP256, public)
    }

    /// The key's ID: the SHA-256 digest of the canonical JSON form of the key
    /// record. Computed on first use and cached.
    pub fn key_id(&self) -> Result<&Decoded<Hex>> {
        if let Some(id) = self.id.get() {
            return Ok(id);
        }
        let mut data = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut data, CanonicalFormatter::new());
        self.serialize(&mut ser)
            .context(error::JsonSerializationSnafu { what: "key" })?;
        let calculated = Decoded::from(digest(&SHA256, &data).as_ref().to_vec());
        Ok(self.id.get_or_init(|| calculated))
    }

    /// Verifies `signature` over `msg` with this key. Unrecognized key types
    /// or schemes, and undecodable key material, verify as `false`.
    pub fn verify(&self, msg: &[u8], signature: &[u8]) -> bool {
        let (alg, public): (&dyn VerificationAlgorithm, Vec<u8>) =
            match (self.keytype.as_str(), self.scheme.as_str()) {
                (KEY_TYPE_ED25519, SCHEME_ED25519) => {
                    match hex::decode(&self.keyval.public) {
                        Ok(public) => (&signature::ED25519, public),
                        Err(_) => return false,
                    }
                }
                (
                    KEY_TYPE_ECDSA | SCHEME_ECDSA_SHA2_NISTP256,
                    SCHEME_ECDSA_SHA2_NISTP256,
                ) => {
                    match spki::decode(
                        &self.keyval.public,
                        spki::OID_EC_PUBLIC_KEY,
                        &spki::Params::Oid(spki::OID_NISTP256),
                    ) {
                        Ok(public) => (&signature::ECDSA_P256_SHA256_ASN1, public),
                        Err(_) => return false,
                    }
                }
                (KEY_TYPE_RSA, SCHEME_RSASSA_PSS_SHA256) => {
                    match spki::decode(
                        &self.keyval.public,
                        spki::OID_RSA_ENCRYPTION,
                        &spki::Params::Null,
                    ) {
                        Ok(public) => (&signature::RSA_PSS_2048_8192_SHA256, public),
                        Err(_) => return false,
                    }
                }
                _ => return false,
            };

        signature::UnparsedPublicKey::new(alg, &public)
            .verify(msg, signature)
            .is_ok()
    }
}
