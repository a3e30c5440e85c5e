//! Contains the error type for this library.

use crate::fetcher::FetchError;
use crate::schema;
use snafu::Snafu;
use std::path::PathBuf;

/// Alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for the trusted metadata set and updater workflow.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// Candidate metadata failed to parse.
    #[snafu(display("Failed to parse {role} metadata: {source}"))]
    ParseMetadata {
        /// The role being parsed.
        role: String,
        /// The source of the error.
        source: schema::Error,
    },

    /// Candidate metadata failed signature verification or structural
    /// validation.
    #[snafu(display("Failed to verify {role} metadata: {source}"))]
    VerifyMetadata {
        /// The role being verified.
        role: String,
        /// The source of the error.
        source: schema::Error,
    },

    /// A candidate carried a version other than the one required: a rollback,
    /// or a version that disagrees with what another role declared.
    #[snafu(display("Bad version number for {role}: expected {expected}, found {found}"))]
    BadVersionNumber {
        /// The role with the unacceptable version.
        role: String,
        /// The version that was required (exactly, or as a minimum).
        expected: u64,
        /// The version found in the candidate.
        found: u64,
    },

    /// A role's expiry timestamp is at or before the reference time.
    #[snafu(display("{role} metadata is expired"))]
    ExpiredMetadata {
        /// The expired role.
        role: String,
    },

    /// Candidate metadata declares a specification version we do not support.
    #[snafu(display("Unsupported spec_version {spec_version} in {role} metadata"))]
    SpecVersion {
        /// The role carrying the spec version.
        role: String,
        /// The unsupported version string.
        spec_version: String,
    },

    /// An update operation was attempted in an order the client workflow
    /// forbids.
    #[snafu(display("{reason}"))]
    UpdateOrder {
        /// Why the operation was refused.
        reason: String,
    },

    /// A meta map is missing a required entry.
    #[snafu(display("Missing meta entry for {name}"))]
    MetaMissing {
        /// The missing meta entry, e.g. `role1.json`.
        name: String,
    },

    /// A role was referenced that is not in the trusted set.
    #[snafu(display("Role {name} is not trusted"))]
    UnknownRole {
        /// The name of the role.
        name: String,
    },

    /// Bytes did not match their declared length or hashes.
    #[snafu(display("{what} failed length/hash verification: {source}"))]
    LengthOrHashes {
        /// What was being verified (a role or target path).
        what: String,
        /// The source of the error.
        source: schema::Error,
    },

    /// A download failed.
    #[snafu(display("{source}"))]
    Fetch {
        /// The source of the error.
        source: FetchError,
    },

    /// The delegation graph was exhausted without finding the target.
    #[snafu(display("Target {target} not found in any trusted role"))]
    TargetNotFound {
        /// The requested target path.
        target: String,
    },

    /// No trusted root metadata in the local metadata directory.
    #[snafu(display("Trusted root metadata not found at {}", path.display()))]
    MissingTrustedRoot {
        /// Where the root was expected.
        path: PathBuf,
    },

    /// A target descriptor carries no hashes to prefix its URL with.
    #[snafu(display("Target {target} lists no hashes"))]
    MissingTargetHashes {
        /// The target path.
        target: String,
    },

    /// A target directory is required but was not configured.
    #[snafu(display("A target directory must be set to generate target file paths"))]
    NoTargetDir,

    /// A target base URL is required but was not configured.
    #[snafu(display("A target base URL must be set to download targets"))]
    NoTargetBaseUrl,

    /// A URL could not be joined with a path.
    #[snafu(display("Failed to join {path} to URL: {source}"))]
    JoinUrl {
        /// The path being joined.
        path: String,
        /// The source of the error.
        source: url::ParseError,
    },

    /// Unable to create the metadata cache directory.
    #[snafu(display("Failed to create datastore directory {}: {source}", path.display()))]
    DatastoreDir {
        /// The directory path.
        path: PathBuf,
        /// The source of the error.
        source: std::io::Error,
    },

    /// Unable to read a file from the metadata cache.
    #[snafu(display("Failed to read {} from datastore: {source}", path.display()))]
    DatastoreRead {
        /// The file path.
        path: PathBuf,
        /// The source of the error.
        source: std::io::Error,
    },

    /// Unable to create a temporary file in the metadata cache directory.
    #[snafu(display("Failed to create temporary file in {}: {source}", path.display()))]
    DatastoreTempFile {
        /// The datastore directory.
        path: PathBuf,
        /// The source of the error.
        source: std::io::Error,
    },

    /// Unable to write a temporary file in the metadata cache directory.
    #[snafu(display("Failed to write temporary file for {}: {source}", path.display()))]
    DatastoreWrite {
        /// The destination path.
        path: PathBuf,
        /// The source of the error.
        source: std::io::Error,
    },

    /// Unable to rename a temporary file over its destination.
    #[snafu(display("Failed to persist {}: {source}", path.display()))]
    DatastorePersist {
        /// The destination path.
        path: PathBuf,
        /// The source of the error.
        source: tempfile::PersistError,
    },

    /// Unable to read a cached target file.
    #[snafu(display("Failed to read {}: {source}", path.display()))]
    FileRead {
        /// The file path.
        path: PathBuf,
        /// The source of the error.
        source: std::io::Error,
    },

    /// Unable to write a downloaded target file.
    #[snafu(display("Failed to write {}: {source}", path.display()))]
    FileWrite {
        /// The file path.
        path: PathBuf,
        /// The source of the error.
        source: std::io::Error,
    },
}
