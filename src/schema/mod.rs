//! Provides the metadata model: the four top-level TUF role documents, keys,
//! signatures, file descriptors, and delegation records, along with canonical
//! JSON serialization and signature verification.

mod de;
pub mod decoded;
pub(crate) mod error;
mod iter;
pub mod key;
pub(crate) mod spki;
mod verify;

pub use crate::schema::error::{Error, Result};
pub use crate::schema::key::{Key, KeyVal};
pub use crate::schema::verify::verify_length_hashes;

use crate::schema::decoded::{Decoded, Hex};
use crate::schema::iter::KeysIter;
use crate::sign::Sign;
use chrono::{DateTime, Utc};
use globset::Glob;
use olpc_cjson::CanonicalFormatter;
use ring::digest::{digest, SHA256};
use ring::rand::SecureRandom;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_plain::{forward_display_to_serde, forward_from_str_to_serde};
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU64;
use std::path::Path;

/// The version of the TUF specification this crate implements.
pub const SPECIFICATION_VERSION: &str = "1.0.31";

/// The name of the root role.
pub const ROOT: &str = "root";
/// The name of the timestamp role.
pub const TIMESTAMP: &str = "timestamp";
/// The name of the snapshot role.
pub const SNAPSHOT: &str = "snapshot";
/// The name of the top-level targets role.
pub const TARGETS: &str = "targets";

/// The type of metadata role.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum RoleType {
    /// The root role delegates trust to specific keys trusted for all other top-level roles used in
    /// the system.
    Root,
    /// The timestamp role is used to prevent an adversary from replaying an out-of-date signed
    /// metadata file whose signature has not yet expired.
    Timestamp,
    /// The snapshot role signs a metadata file that provides information about the latest version
    /// of all targets metadata on the repository (the top-level targets role and all delegated
    /// roles).
    Snapshot,
    /// The targets role's signature indicates which target files are trusted by clients.
    Targets,
}

forward_display_to_serde!(RoleType);
forward_from_str_to_serde!(RoleType);

/// Common trait implemented by all roles.
pub trait Role: Serialize {
    /// The type of role this object represents.
    const TYPE: RoleType;

    /// Determines when metadata should be considered expired and no longer trusted by clients.
    fn expires(&self) -> DateTime<Utc>;

    /// An integer that is greater than 0. Clients MUST NOT replace a metadata file with a version
    /// number less than the one currently trusted.
    fn version(&self) -> NonZeroU64;

    /// A deterministic JSON serialization used as the input to all signature
    /// operations: UTF-8, object keys sorted, no insignificant whitespace.
    /// [More info on canonical JSON](http://wiki.laptop.org/go/Canonical_JSON)
    fn canonical_form(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut data, CanonicalFormatter::new());
        self.serialize(&mut ser)
            .context(error::JsonSerializationSnafu { what: "role" })?;
        Ok(data)
    }
}

/// A signed metadata object: the envelope shared by all four role documents.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Signed<T> {
    /// The role that is signed.
    pub signed: T,
    /// A list of signatures and their key IDs.
    pub signatures: Vec<Signature>,
}

/// A signature and the key ID that made it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Signature {
    /// The key ID (listed in root.json) that made this signature.
    pub keyid: Decoded<Hex>,
    /// A hex-encoded signature of the canonical JSON form of a role.
    pub sig: Decoded<Hex>,
}

/// A peek at the `signed._type` field, used to produce a useful error before
/// committing to a full parse.
#[derive(Debug, Default, Deserialize)]
struct Probe {
    #[serde(default)]
    signed: ProbeSigned,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeSigned {
    #[serde(rename = "_type", default)]
    type_name: Option<String>,
}

impl<T: Role + DeserializeOwned> Signed<T> {
    /// Parses metadata from JSON bytes, requiring the payload's `_type` to
    /// name the expected role.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let probe: Probe = serde_json::from_slice(data).context(error::JsonParseSnafu)?;
        let expected = T::TYPE.to_string();
        let found = probe.signed.type_name.unwrap_or_default();
        ensure!(
            found == expected,
            error::TypeMismatchSnafu { expected, found }
        );
        serde_json::from_slice(data).context(error::JsonParseSnafu)
    }

    /// Parses metadata from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).context(error::FileReadSnafu { path })?;
        Self::from_bytes(&data)
    }
}

impl<T: Role> Signed<T> {
    /// Serializes the metadata, either as canonical JSON (`pretty = false`,
    /// the form used for signing and hashing) or indented for humans.
    /// Object keys are sorted in both forms.
    pub fn to_bytes(&self, pretty: bool) -> Result<Vec<u8>> {
        if pretty {
            let value = serde_json::to_value(self)
                .context(error::JsonSerializationSnafu { what: "signed role" })?;
            serde_json::to_vec_pretty(&value)
                .context(error::JsonSerializationSnafu { what: "signed role" })
        } else {
            let mut data = Vec::new();
            let mut ser =
                serde_json::Serializer::with_formatter(&mut data, CanonicalFormatter::new());
            self.serialize(&mut ser)
                .context(error::JsonSerializationSnafu { what: "signed role" })?;
            Ok(data)
        }
    }

    /// Writes the serialized metadata to a file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P, pretty: bool) -> Result<()> {
        let path = path.as_ref();
        let data = self.to_bytes(pretty)?;
        std::fs::write(path, data).context(error::FileWriteSnafu { path })
    }

    /// Signs the payload with `signer`, appends the signature, and returns it.
    /// Existing signatures are kept; use [`Self::clear_signatures`] to replace
    /// them.
    pub fn sign(&mut self, signer: &dyn Sign, rng: &dyn SecureRandom) -> Result<Signature> {
        let keyid = signer.tuf_key().key_id()?.clone();
        let canonical = self.signed.canonical_form()?;
        let sig = signer.sign(&canonical, rng)?;
        let signature = Signature {
            keyid,
            sig: sig.into(),
        };
        self.signatures.push(signature.clone());
        Ok(signature)
    }

    /// Removes all signatures.
    pub fn clear_signatures(&mut self) {
        self.signatures.clear();
    }
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// The root.json file is signed by the root role's keys. It indicates which keys are authorized
/// for all top-level roles, including the root role itself. Revocation and replacement of
/// top-level role keys, including for the root role, is done by changing the keys listed for the
/// roles in this file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "_type")]
#[serde(rename = "root")]
pub struct Root {
    /// A string that contains the version number of the TUF specification. Its format follows the
    /// Semantic Versioning 2.0.0 (semver) specification.
    pub spec_version: String,

    /// A boolean indicating whether the repository supports consistent snapshots. When consistent
    /// snapshots is `true`, targets and certain metadata filenames are prefixed with either a
    /// version number or digest.
    pub consistent_snapshot: bool,

    /// An integer that is greater than 0. Clients MUST NOT replace a metadata file with a version
    /// number less than the one currently trusted.
    pub version: NonZeroU64,

    /// Determines when metadata should be considered expired and no longer trusted by clients.
    pub expires: DateTime<Utc>,

    /// The KEYID must be correct for the specified KEY. Clients MUST calculate each KEYID to verify
    /// this is correct for the associated key. Clients MUST ensure that for any KEYID represented
    /// in this key list and in other files, only one unique key has that KEYID.
    #[serde(deserialize_with = "de::deserialize_keys")]
    pub keys: HashMap<Decoded<Hex>, Key>,

    /// A list of roles, the keys associated with each role, and the threshold of signatures used
    /// for each role.
    pub roles: HashMap<RoleType, RoleKeys>,

    /// Extra arguments found during deserialization.
    ///
    /// We must store these to correctly verify signatures for this object.
    ///
    /// If you're instantiating this struct, you should make this `HashMap::new()`.
    #[serde(flatten)]
    #[serde(deserialize_with = "de::extra_skip_type")]
    pub _extra: HashMap<String, Value>,
}

/// Represents the key IDs used for a role and the threshold of signatures required to validate it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RoleKeys {
    /// The key IDs used for the role.
    pub keyids: Vec<Decoded<Hex>>,

    /// The threshold of signatures required to validate the role.
    pub threshold: NonZeroU64,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

impl Root {
    /// An iterator over the keys for a given role.
    pub fn keys(&self, role: RoleType) -> impl Iterator<Item = &Key> {
        KeysIter {
            keyids_iter: match self.roles.get(&role) {
                Some(role_keys) => role_keys.keyids.iter(),
                None => [].iter(),
            },
            keys: &self.keys,
        }
    }

    /// Checks the structural invariants of a root document: all four
    /// top-level roles must be present, each with a non-empty list of key IDs
    /// that all resolve in the keys map. (Thresholds are non-zero by type.)
    pub fn validate(&self) -> Result<()> {
        for role in [
            RoleType::Root,
            RoleType::Timestamp,
            RoleType::Snapshot,
            RoleType::Targets,
        ] {
            let role_keys = self
                .roles
                .get(&role)
                .context(error::MissingRoleSnafu { role: role.to_string() })?;
            ensure!(
                !role_keys.keyids.is_empty(),
                error::EmptyKeyIdsSnafu { role: role.to_string() }
            );
            for keyid in &role_keys.keyids {
                ensure!(
                    self.keys.contains_key(keyid),
                    error::UnknownKeyIdSnafu {
                        role: role.to_string(),
                        keyid: hex::encode(keyid),
                    }
                );
            }
        }
        Ok(())
    }
}

impl Role for Root {
    const TYPE: RoleType = RoleType::Root;

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    fn version(&self) -> NonZeroU64 {
        self.version
    }
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// Represents a `timestamp.json` file. The timestamp file is signed by a timestamp key. It
/// indicates the latest version of the snapshot metadata and is frequently resigned to limit the
/// amount of time a client can be kept unaware of interference with obtaining updates.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "_type")]
#[serde(rename = "timestamp")]
pub struct Timestamp {
    /// A string that contains the version number of the TUF specification.
    pub spec_version: String,

    /// An integer that is greater than 0. Clients MUST NOT replace a metadata file with a version
    /// number less than the one currently trusted.
    pub version: NonZeroU64,

    /// Determines when metadata should be considered expired and no longer trusted by clients.
    pub expires: DateTime<Utc>,

    /// A map describing the current snapshot metadata. This MUST contain exactly one entry, keyed
    /// `snapshot.json`.
    pub meta: HashMap<String, MetaFile>,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    #[serde(deserialize_with = "de::extra_skip_type")]
    pub _extra: HashMap<String, Value>,
}

impl Timestamp {
    /// Creates a new `Timestamp` object with an empty meta map.
    pub fn new(spec_version: String, version: NonZeroU64, expires: DateTime<Utc>) -> Self {
        Timestamp {
            spec_version,
            version,
            expires,
            meta: HashMap::new(),
            _extra: HashMap::new(),
        }
    }

    /// The meta entry describing the current snapshot, if present.
    pub fn snapshot_meta(&self) -> Option<&MetaFile> {
        self.meta.get("snapshot.json")
    }
}

impl Role for Timestamp {
    const TYPE: RoleType = RoleType::Timestamp;

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    fn version(&self) -> NonZeroU64 {
        self.version
    }
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// Represents a `snapshot.json` file. It MUST list the version numbers of the top-level targets
/// metadata and all delegated targets metadata. It MAY also list their lengths and file hashes.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "_type")]
#[serde(rename = "snapshot")]
pub struct Snapshot {
    /// A string that contains the version number of the TUF specification.
    pub spec_version: String,

    /// An integer that is greater than 0. Clients MUST NOT replace a metadata file with a version
    /// number less than the one currently trusted.
    pub version: NonZeroU64,

    /// Determines when metadata should be considered expired and no longer trusted by clients.
    pub expires: DateTime<Utc>,

    /// One entry per targets role, keyed by metadata file name (at least `targets.json`).
    pub meta: HashMap<String, MetaFile>,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    #[serde(deserialize_with = "de::extra_skip_type")]
    pub _extra: HashMap<String, Value>,
}

impl Snapshot {
    /// Creates a new `Snapshot` object with an empty meta map.
    pub fn new(spec_version: String, version: NonZeroU64, expires: DateTime<Utc>) -> Self {
        Snapshot {
            spec_version,
            version,
            expires,
            meta: HashMap::new(),
            _extra: HashMap::new(),
        }
    }
}

impl Role for Snapshot {
    const TYPE: RoleType = RoleType::Snapshot;

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    fn version(&self) -> NonZeroU64 {
        self.version
    }
}

/// Describes a metadata file listed in `timestamp.json` or `snapshot.json`:
/// its version, and optionally its length and hashes.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MetaFile {
    /// The integer length in bytes of the metadata file. OPTIONAL; when
    /// absent the client uses a configured download limit instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,

    /// One or more hashes of the metadata file, keyed by algorithm. OPTIONAL;
    /// when absent, the version alone identifies the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashes: Option<Hashes>,

    /// An integer that is greater than 0. Clients MUST NOT replace a metadata file with a version
    /// number less than the one currently trusted.
    pub version: NonZeroU64,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

impl MetaFile {
    /// Checks `data` against this entry's declared length and hashes, where
    /// present.
    pub fn verify_length_hashes(&self, data: &[u8]) -> Result<()> {
        verify_length_hashes(data, self.length, self.hashes.as_ref())
    }
}

/// A dictionary of hashes keyed by algorithm name; `sha256` and `sha512` are
/// the algorithms this implementation can check.
pub type Hashes = BTreeMap<String, Decoded<Hex>>;

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// Represents a `targets.json` file, either the top-level targets role or a delegated targets
/// role.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "_type")]
#[serde(rename = "targets")]
pub struct Targets {
    /// A string that contains the version number of the TUF specification.
    pub spec_version: String,

    /// An integer that is greater than 0. Clients MUST NOT replace a metadata file with a version
    /// number less than the one currently trusted.
    pub version: NonZeroU64,

    /// Determines when metadata should be considered expired and no longer trusted by clients.
    pub expires: DateTime<Utc>,

    /// Each key of the map is a TARGETPATH: a path to a file that is relative to a mirror's base
    /// URL of targets.
    pub targets: HashMap<String, Target>,

    /// Describes subsets of the targets for which responsibility is delegated to other roles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegations: Option<Delegations>,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    #[serde(deserialize_with = "de::extra_skip_type")]
    pub _extra: HashMap<String, Value>,
}

impl Targets {
    /// Creates a new `Targets` object with no targets and no delegations.
    pub fn new(spec_version: String, version: NonZeroU64, expires: DateTime<Utc>) -> Self {
        Targets {
            spec_version,
            version,
            expires,
            targets: HashMap::new(),
            delegations: None,
            _extra: HashMap::new(),
        }
    }
}

impl Role for Targets {
    const TYPE: RoleType = RoleType::Targets;

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    fn version(&self) -> NonZeroU64 {
        self.version
    }
}

/// Describes a target file: its length, hashes, and opaque application data.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Target {
    /// The integer length in bytes of the target file.
    pub length: u64,

    /// One or more hashes of the target file, keyed by algorithm.
    pub hashes: Hashes,

    /// Opaque data made available to the client application, e.g. version numbers or
    /// dependencies.
    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub custom: HashMap<String, Value>,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,

    /// The target path this descriptor was found under. Not part of the wire
    /// format; populated when a target is returned from lookup.
    #[serde(skip)]
    pub path: String,
}

impl Target {
    /// Checks `data` against this target's declared length and every declared
    /// hash.
    pub fn verify_length_hashes(&self, data: &[u8]) -> Result<()> {
        verify_length_hashes(data, Some(self.length), Some(&self.hashes))
    }
}

/// Delegations found in a `targets.json` file: the public keys used by
/// delegated roles, and the ordered list of delegated roles.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Delegations {
    /// Lists the public keys to verify signatures of delegated targets roles. Revocation and
    /// replacement of delegated targets roles keys is done by changing the keys in this field in
    /// the delegating role's metadata.
    #[serde(deserialize_with = "de::deserialize_keys")]
    pub keys: HashMap<Decoded<Hex>, Key>,

    /// The list of delegated roles, in order of priority.
    pub roles: Vec<DelegatedRole>,
}

impl Delegations {
    /// Creates a new `Delegations` with no keys or roles.
    pub fn new() -> Self {
        Delegations {
            keys: HashMap::new(),
            roles: Vec::new(),
        }
    }

    /// Returns the delegated role called `role_name`, if this role delegates
    /// to it directly.
    pub fn role(&self, role_name: &str) -> Option<&DelegatedRole> {
        self.roles.iter().find(|role| role.name == role_name)
    }

    /// The delegated roles responsible for `target`, in declaration order.
    pub fn roles_for_target<'a>(
        &'a self,
        target: &'a str,
    ) -> impl Iterator<Item = &'a DelegatedRole> {
        self.roles
            .iter()
            .filter(move |role| role.paths.matched_target(target))
    }
}

impl Default for Delegations {
    fn default() -> Self {
        Self::new()
    }
}

/// Each role delegated in a targets file is considered a delegated role.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DelegatedRole {
    /// The name of the delegated role. For example, "projects".
    pub name: String,

    /// The key IDs used by this role.
    pub keyids: Vec<Decoded<Hex>>,

    /// The threshold of signatures required to validate the role.
    pub threshold: NonZeroU64,

    /// The paths governed by this role.
    #[serde(flatten)]
    pub paths: PathSet,

    /// Indicates whether subsequent delegations should be considered when a
    /// target matches this role.
    pub terminating: bool,
}

/// Specifies the target paths that a delegated role controls.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum PathSet {
    /// A list of path patterns using shell-style wildcards. For example, the pattern
    /// `targets/*.tgz` matches `targets/foo.tgz` but not `targets/foo.txt`.
    #[serde(rename = "paths")]
    Paths(Vec<String>),

    /// A list of hex prefixes of the SHA-256 digest of a target path, used to succinctly split a
    /// large number of targets into bins.
    #[serde(rename = "path_hash_prefixes")]
    PathHashPrefixes(Vec<String>),
}

impl PathSet {
    /// Given a target path, determines if this pathset matches it.
    pub fn matched_target(&self, target: &str) -> bool {
        match self {
            Self::Paths(paths) => paths
                .iter()
                .any(|path| Self::matched_path(path, target)),
            Self::PathHashPrefixes(prefixes) => prefixes
                .iter()
                .any(|prefix| Self::matched_prefix(prefix, target)),
        }
    }

    /// Given a path hash prefix and a target path, determines if the target is delegated by the
    /// prefix.
    fn matched_prefix(prefix: &str, target: &str) -> bool {
        let hash = hex::encode(digest(&SHA256, target.as_bytes()));
        hash.starts_with(prefix)
    }

    /// Given a shell style wildcard path, determines if the target matches the path.
    fn matched_path(wildcard: &str, target: &str) -> bool {
        let Ok(glob) = Glob::new(wildcard) else {
            return false;
        };
        glob.compile_matcher().is_match(target)
    }
}

#[cfg(test)]
mod tests {
    use super::{DelegatedRole, Delegations, PathSet};
    use std::collections::HashMap;
    use std::num::NonZeroU64;

    fn role(name: &str, paths: PathSet, terminating: bool) -> DelegatedRole {
        DelegatedRole {
            name: name.to_string(),
            keyids: Vec::new(),
            threshold: NonZeroU64::new(1).unwrap(),
            paths,
            terminating,
        }
    }

    #[test]
    fn glob_path_matching() {
        let paths = PathSet::Paths(vec!["*.pkg".to_string(), "foo/*".to_string()]);
        assert!(paths.matched_target("app.pkg"));
        assert!(paths.matched_target("foo/x"));
        assert!(!paths.matched_target("bar/x"));
    }

    #[test]
    fn hash_prefix_matching() {
        // sha256("file.txt") is aadf327c8267...
        let matching = PathSet::PathHashPrefixes(vec!["aadf".to_string()]);
        assert!(matching.matched_target("file.txt"));

        let wrong = PathSet::PathHashPrefixes(vec!["aae0".to_string()]);
        assert!(!wrong.matched_target("file.txt"));
    }

    #[test]
    fn roles_for_target_preserves_declaration_order() {
        let delegations = Delegations {
            keys: HashMap::new(),
            roles: vec![
                role("a", PathSet::Paths(vec!["*.pkg".to_string()]), false),
                role("b", PathSet::Paths(vec!["foo/*".to_string()]), true),
                role("c", PathSet::Paths(vec!["foo/*".to_string()]), false),
            ],
        };
        let matched: Vec<&str> = delegations
            .roles_for_target("foo/x")
            .map(|role| role.name.as_str())
            .collect();
        assert_eq!(matched, vec!["b", "c"]);
    }

    #[test]
    fn pathset_serde_form() {
        let role = role("bin", PathSet::Paths(vec!["bin/*".to_string()]), false);
        let value = serde_json::to_value(&role).unwrap();
        assert_eq!(value["paths"][0], "bin/*");
        assert_eq!(value["terminating"], false);
    }
}
