//! Threshold signature verification and length/hash checks.

use crate::schema::decoded::{Decoded, Hex};
use crate::schema::error::{self, Result};
use crate::schema::key::Key;
use crate::schema::{Hashes, Role, Root, Signed, Targets};
use log::trace;
use ring::digest::{digest, SHA256, SHA512};
use snafu::{ensure, OptionExt};
use std::collections::{HashMap, HashSet};
use std::num::NonZeroU64;

/// Verifies that at least `threshold` **distinct** key IDs from `keyids` have
/// a valid signature over the canonical form of `metadata.signed`.
///
/// Duplicate key IDs in the signatures list count once; signatures from key
/// IDs outside the authorized set are ignored.
pub(crate) fn verify_threshold<T: Role>(
    role_name: &str,
    keys: &HashMap<Decoded<Hex>, Key>,
    keyids: &[Decoded<Hex>],
    threshold: NonZeroU64,
    metadata: &Signed<T>,
) -> Result<()> {
    let canonical = metadata.signed.canonical_form()?;

    let mut valid: HashSet<&Decoded<Hex>> = HashSet::new();
    for signature in &metadata.signatures {
        if !keyids.contains(&signature.keyid) {
            trace!(
                "Skipping signature by {}: not an authorized key for role {}",
                signature.keyid,
                role_name
            );
            continue;
        }
        let Some(key) = keys.get(&signature.keyid) else {
            trace!("Skipping signature by {}: key not found", signature.keyid);
            continue;
        };
        if key.verify(&canonical, &signature.sig) {
            valid.insert(&signature.keyid);
        } else {
            trace!(
                "Signature by {} over role {} did not verify",
                signature.keyid,
                role_name
            );
        }
    }

    ensure!(
        valid.len() as u64 >= threshold.get(),
        error::UnsignedMetadataSnafu {
            role: role_name,
            valid: valid.len(),
            threshold: threshold.get(),
        }
    );
    Ok(())
}

impl Root {
    /// Verifies the signatures of a top-level role against this root's keys
    /// and threshold for that role.
    pub fn verify_role<T: Role>(&self, role: &Signed<T>) -> Result<()> {
        let role_keys = self
            .roles
            .get(&T::TYPE)
            .context(error::MissingRoleSnafu { role: T::TYPE.to_string() })?;
        verify_threshold(
            &T::TYPE.to_string(),
            &self.keys,
            &role_keys.keyids,
            role_keys.threshold,
            role,
        )
    }
}

impl Targets {
    /// Verifies the signatures of a delegated targets role against the keys
    /// and threshold this role delegates to it.
    pub fn verify_delegated_role(&self, name: &str, role: &Signed<Targets>) -> Result<()> {
        let delegations = self
            .delegations
            .as_ref()
            .context(error::UnknownDelegatedRoleSnafu { name })?;
        let delegated = delegations
            .role(name)
            .context(error::UnknownDelegatedRoleSnafu { name })?;
        verify_threshold(
            name,
            &delegations.keys,
            &delegated.keyids,
            delegated.threshold,
            role,
        )
    }
}

/// Checks `data` against a declared length and set of hashes. Either bound
/// may be absent; every hash listed must match.
pub fn verify_length_hashes(
    data: &[u8],
    length: Option<u64>,
    hashes: Option<&Hashes>,
) -> Result<()> {
    if let Some(expected) = length {
        ensure!(
            data.len() as u64 == expected,
            error::LengthMismatchSnafu { expected, found: data.len() as u64 }
        );
    }
    if let Some(hashes) = hashes {
        for (algorithm, expected) in hashes {
            let alg = match algorithm.as_str() {
                "sha256" => &SHA256,
                "sha512" => &SHA512,
                _ => {
                    return error::UnsupportedAlgorithmSnafu { algorithm }.fail();
                }
            };
            let calculated = digest(alg, data);
            ensure!(
                calculated.as_ref() == expected.as_bytes(),
                error::HashMismatchSnafu {
                    algorithm,
                    expected: hex::encode(expected),
                    calculated: hex::encode(calculated.as_ref()),
                }
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::verify_length_hashes;
    use crate::schema::decoded::{Decoded, Hex};
    use crate::schema::Hashes;

    fn sha256_of(data: &[u8]) -> Decoded<Hex> {
        Decoded::from(ring::digest::digest(&ring::digest::SHA256, data).as_ref().to_vec())
    }

    #[test]
    fn length_and_hash_pass() {
        let data = b"hello";
        let mut hashes = Hashes::new();
        hashes.insert("sha256".to_string(), sha256_of(data));
        verify_length_hashes(data, Some(5), Some(&hashes)).unwrap();
    }

    #[test]
    fn wrong_length_fails() {
        assert!(verify_length_hashes(b"hello", Some(4), None).is_err());
    }

    #[test]
    fn wrong_hash_fails() {
        let mut hashes = Hashes::new();
        hashes.insert("sha256".to_string(), sha256_of(b"other"));
        assert!(verify_length_hashes(b"hello", None, Some(&hashes)).is_err());
    }

    #[test]
    fn unknown_algorithm_fails() {
        let mut hashes = Hashes::new();
        hashes.insert("md5".to_string(), Decoded::from(vec![0u8; 16]));
        assert!(verify_length_hashes(b"hello", None, Some(&hashes)).is_err());
    }
}
