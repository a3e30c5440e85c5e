//! Error types for the metadata model.

use snafu::Snafu;
use std::path::PathBuf;

/// Alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for metadata parsing, serialization, and verification.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// The metadata could not be parsed as JSON.
    #[snafu(display("Failed to parse metadata: {source}"))]
    JsonParse {
        /// The source of the error.
        source: serde_json::Error,
    },

    /// A value could not be serialized to JSON.
    #[snafu(display("Failed to serialize {what} to JSON: {source}"))]
    JsonSerialization {
        /// What was being serialized.
        what: String,
        /// The source of the error.
        source: serde_json::Error,
    },

    /// The `_type` field did not match the expected role.
    #[snafu(display("expected metadata type {expected}, got - {found}"))]
    TypeMismatch {
        /// The role we expected to parse.
        expected: String,
        /// The `_type` value actually present.
        found: String,
    },

    /// A hex string failed to decode.
    #[snafu(display("Invalid hex string: {source}"))]
    HexDecode {
        /// The source of the error.
        source: hex::FromHexError,
    },

    /// A key was registered under a key ID that does not match its contents.
    #[snafu(display("Invalid key ID {keyid}: calculated {calculated}"))]
    InvalidKeyId {
        /// The key ID the key was registered under.
        keyid: String,
        /// The key ID calculated from the key itself.
        calculated: String,
    },

    /// The same key ID appeared twice in a keys map.
    #[snafu(display("Duplicate key ID: {keyid}"))]
    DuplicateKeyId {
        /// The duplicated key ID.
        keyid: String,
    },

    /// Fewer distinct valid signatures than the role's threshold.
    #[snafu(display(
        "Metadata for role {role} is signed by {valid} of {threshold} required keys"
    ))]
    UnsignedMetadata {
        /// The role that failed verification.
        role: String,
        /// How many distinct valid signatures were found.
        valid: usize,
        /// The role's signature threshold.
        threshold: u64,
    },

    /// A role required by the root metadata is missing.
    #[snafu(display("Missing {role} in roles of root metadata"))]
    MissingRole {
        /// The missing role.
        role: String,
    },

    /// A role lists no key IDs at all.
    #[snafu(display("Role {role} lists no key IDs"))]
    EmptyKeyIds {
        /// The role with an empty keyids list.
        role: String,
    },

    /// A role references a key ID absent from the keys map.
    #[snafu(display("Role {role} references unknown key ID {keyid}"))]
    UnknownKeyId {
        /// The role referencing the key.
        role: String,
        /// The unresolvable key ID.
        keyid: String,
    },

    /// A named role is not present in a delegations record.
    #[snafu(display("Role {name} is not delegated"))]
    UnknownDelegatedRole {
        /// The role name that could not be found.
        name: String,
    },

    /// Data did not match its declared length.
    #[snafu(display("Length verification failed: expected {expected}, found {found}"))]
    LengthMismatch {
        /// The declared length.
        expected: u64,
        /// The actual length.
        found: u64,
    },

    /// Data did not match a declared hash.
    #[snafu(display(
        "{algorithm} hash mismatch: expected {expected}, calculated {calculated}"
    ))]
    HashMismatch {
        /// The hash algorithm.
        algorithm: String,
        /// The declared digest (hex).
        expected: String,
        /// The calculated digest (hex).
        calculated: String,
    },

    /// A hashes map listed an algorithm we cannot compute.
    #[snafu(display("Unsupported hash algorithm: {algorithm}"))]
    UnsupportedAlgorithm {
        /// The unrecognized algorithm name.
        algorithm: String,
    },

    /// A PEM document failed to parse.
    #[snafu(display("Unable to parse PEM document: {source}"))]
    PemParse {
        /// The source of the error.
        source: pem::PemError,
    },

    /// A `SubjectPublicKeyInfo` document was malformed or unexpected.
    #[snafu(display("Invalid SubjectPublicKeyInfo document: {reason}"))]
    SpkiDecode {
        /// Why the document was rejected.
        reason: &'static str,
    },

    /// Failed to open or read a file.
    #[snafu(display("Failed to read {}: {source}", path.display()))]
    FileRead {
        /// The path that could not be read.
        path: PathBuf,
        /// The source of the error.
        source: std::io::Error,
    },

    /// Failed to write a file.
    #[snafu(display("Failed to write {}: {source}", path.display()))]
    FileWrite {
        /// The path that could not be written.
        path: PathBuf,
        /// The source of the error.
        source: std::io::Error,
    },

    /// A signing operation failed.
    #[snafu(display("Failed to sign message"))]
    Sign {
        /// The source of the error.
        source: ring::error::Unspecified,
    },

    /// A private key was rejected by ring.
    #[snafu(display("Key rejected: {source}"))]
    KeyRejected {
        /// The source of the error.
        source: ring::error::KeyRejected,
    },

    /// A private key document was not in a recognized format.
    #[snafu(display("Unrecognized private key format"))]
    KeyUnrecognized,
}
