#![allow(dead_code)]

//! Utilities for tests: an in-memory repository simulator with generated
//! ed25519 keys, and an in-memory fetcher that serves its files.

use chrono::{DateTime, Duration, Utc};
use ring::rand::SystemRandom;
use ring::signature::Ed25519KeyPair;
use staunch::schema::{
    DelegatedRole, Delegations, Hashes, MetaFile, PathSet, Role, RoleKeys, RoleType, Root, Signed,
    Snapshot, Target, Targets, Timestamp, SPECIFICATION_VERSION,
};
use staunch::{FetchError, Fetcher, Sign, Updater, UpdaterConfig};
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::path::Path;
use url::Url;

pub const METADATA_BASE: &str = "https://example.org/metadata/";
pub const TARGET_BASE: &str = "https://example.org/targets/";

pub fn generate_keypair() -> Ed25519KeyPair {
    let rng = SystemRandom::new();
    let document = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
    Ed25519KeyPair::from_pkcs8(document.as_ref()).unwrap()
}

pub fn version(v: u64) -> NonZeroU64 {
    NonZeroU64::new(v).unwrap()
}

/// An expiry timestamp `days` days from now.
pub fn days(days: i64) -> DateTime<Utc> {
    Utc::now() + Duration::days(days)
}

pub fn sign_role<T: Role>(role: T, signers: &[&Ed25519KeyPair]) -> Signed<T> {
    let rng = SystemRandom::new();
    let mut signed = Signed {
        signed: role,
        signatures: Vec::new(),
    };
    for signer in signers {
        signed.sign(*signer, &rng).unwrap();
    }
    signed
}

pub fn resign<T: Role>(signed: &mut Signed<T>, signer: &Ed25519KeyPair) {
    signed.clear_signatures();
    signed.sign(signer, &SystemRandom::new()).unwrap();
}

pub fn sha256_hashes(data: &[u8]) -> Hashes {
    let digest = ring::digest::digest(&ring::digest::SHA256, data);
    let mut hashes = Hashes::new();
    hashes.insert("sha256".to_string(), digest.as_ref().to_vec().into());
    hashes
}

pub fn make_target(data: &[u8]) -> Target {
    Target {
        length: data.len() as u64,
        hashes: sha256_hashes(data),
        custom: HashMap::new(),
        _extra: HashMap::new(),
        path: String::new(),
    }
}

pub fn meta_file(version_number: u64) -> MetaFile {
    MetaFile {
        length: None,
        hashes: None,
        version: version(version_number),
        _extra: HashMap::new(),
    }
}

pub fn meta_file_for(version_number: u64, data: &[u8]) -> MetaFile {
    MetaFile {
        length: Some(data.len() as u64),
        hashes: Some(sha256_hashes(data)),
        version: version(version_number),
        _extra: HashMap::new(),
    }
}

pub fn timestamp_payload(version_number: u64, expires: DateTime<Utc>, meta: MetaFile) -> Timestamp {
    let mut timestamp =
        Timestamp::new(SPECIFICATION_VERSION.to_string(), version(version_number), expires);
    timestamp.meta.insert("snapshot.json".to_string(), meta);
    timestamp
}

pub fn snapshot_payload(
    version_number: u64,
    expires: DateTime<Utc>,
    meta: Vec<(&str, MetaFile)>,
) -> Snapshot {
    let mut snapshot =
        Snapshot::new(SPECIFICATION_VERSION.to_string(), version(version_number), expires);
    for (name, entry) in meta {
        snapshot.meta.insert(name.to_string(), entry);
    }
    snapshot
}

pub fn targets_payload(version_number: u64, expires: DateTime<Utc>) -> Targets {
    Targets::new(SPECIFICATION_VERSION.to_string(), version(version_number), expires)
}

/// An in-memory repository: one ed25519 key per top-level role, version 1 of
/// every role document, and helpers to mutate and re-publish the repository
/// the way a repository host would.
pub struct RepoSimulator {
    pub root_key: Ed25519KeyPair,
    pub timestamp_key: Ed25519KeyPair,
    pub snapshot_key: Ed25519KeyPair,
    pub targets_key: Ed25519KeyPair,
    pub delegated_keys: HashMap<String, Ed25519KeyPair>,
    pub root: Signed<Root>,
    pub root_history: Vec<Signed<Root>>,
    pub timestamp: Signed<Timestamp>,
    pub snapshot: Signed<Snapshot>,
    pub targets: HashMap<String, Signed<Targets>>,
    pub target_files: HashMap<String, Vec<u8>>,
}

pub fn build_root(
    version_number: u64,
    expires: DateTime<Utc>,
    consistent_snapshot: bool,
    role_keys: &[(RoleType, &Ed25519KeyPair)],
) -> Root {
    let mut keys = HashMap::new();
    let mut roles = HashMap::new();
    for (role_type, keypair) in role_keys {
        let key = keypair.tuf_key();
        let keyid = key.key_id().unwrap().clone();
        roles
            .entry(*role_type)
            .or_insert_with(|| RoleKeys {
                keyids: Vec::new(),
                threshold: version(1),
                _extra: HashMap::new(),
            })
            .keyids
            .push(keyid.clone());
        keys.insert(keyid, key);
    }
    Root {
        spec_version: SPECIFICATION_VERSION.to_string(),
        consistent_snapshot,
        version: version(version_number),
        expires,
        keys,
        roles,
        _extra: HashMap::new(),
    }
}

impl RepoSimulator {
    pub fn new() -> Self {
        Self::new_with(false)
    }

    /// A repository in consistent-snapshot mode: metadata is additionally
    /// addressable by version-prefixed names and targets by hash-prefixed
    /// names.
    pub fn new_consistent() -> Self {
        Self::new_with(true)
    }

    fn new_with(consistent_snapshot: bool) -> Self {
        let root_key = generate_keypair();
        let timestamp_key = generate_keypair();
        let snapshot_key = generate_keypair();
        let targets_key = generate_keypair();

        let root_payload = build_root(
            1,
            days(365),
            consistent_snapshot,
            &[
                (RoleType::Root, &root_key),
                (RoleType::Timestamp, &timestamp_key),
                (RoleType::Snapshot, &snapshot_key),
                (RoleType::Targets, &targets_key),
            ],
        );
        let root = sign_role(root_payload, &[&root_key]);

        let targets = sign_role(targets_payload(1, days(30)), &[&targets_key]);
        let snapshot = sign_role(
            snapshot_payload(1, days(30), vec![("targets.json", meta_file(1))]),
            &[&snapshot_key],
        );
        let timestamp = sign_role(
            timestamp_payload(1, days(7), meta_file(1)),
            &[&timestamp_key],
        );

        let mut targets_map = HashMap::new();
        targets_map.insert("targets".to_string(), targets);

        Self {
            root_history: vec![root.clone()],
            root,
            root_key,
            timestamp_key,
            snapshot_key,
            targets_key,
            delegated_keys: HashMap::new(),
            timestamp,
            snapshot,
            targets: targets_map,
            target_files: HashMap::new(),
        }
    }

    pub fn root_bytes(&self) -> Vec<u8> {
        self.root.to_bytes(true).unwrap()
    }

    /// Publishes the next root version, signed by the existing root key.
    pub fn rotate_root(&mut self) {
        let payload = build_root(
            self.root.signed.version.get() + 1,
            self.root.signed.expires,
            self.root.signed.consistent_snapshot,
            &[
                (RoleType::Root, &self.root_key),
                (RoleType::Timestamp, &self.timestamp_key),
                (RoleType::Snapshot, &self.snapshot_key),
                (RoleType::Targets, &self.targets_key),
            ],
        );
        self.root = sign_role(payload, &[&self.root_key]);
        self.root_history.push(self.root.clone());
    }

    /// Rotates the root role to a new key. The new root is signed by both the
    /// outgoing and the incoming key, as a root rotation must be.
    pub fn rotate_root_key(&mut self) {
        let new_key = generate_keypair();
        let payload = build_root(
            self.root.signed.version.get() + 1,
            self.root.signed.expires,
            self.root.signed.consistent_snapshot,
            &[
                (RoleType::Root, &new_key),
                (RoleType::Timestamp, &self.timestamp_key),
                (RoleType::Snapshot, &self.snapshot_key),
                (RoleType::Targets, &self.targets_key),
            ],
        );
        self.root = sign_role(payload, &[&self.root_key, &new_key]);
        self.root_history.push(self.root.clone());
        self.root_key = new_key;
    }

    pub fn add_target(&mut self, path: &str, data: &[u8]) {
        self.add_delegated_target("targets", path, data);
    }

    pub fn add_delegated_target(&mut self, role: &str, path: &str, data: &[u8]) {
        self.targets
            .get_mut(role)
            .unwrap()
            .signed
            .targets
            .insert(path.to_string(), make_target(data));
        self.target_files.insert(path.to_string(), data.to_vec());
    }

    /// Delegates a new role from `parent`, generating a key for it and
    /// registering an empty targets document for it.
    pub fn add_delegation(&mut self, parent: &str, name: &str, paths: PathSet, terminating: bool) {
        let keypair = generate_keypair();
        let key = keypair.tuf_key();
        let keyid = key.key_id().unwrap().clone();

        let parent_targets = &mut self.targets.get_mut(parent).unwrap().signed;
        let delegations = parent_targets
            .delegations
            .get_or_insert_with(Delegations::new);
        delegations.keys.insert(keyid.clone(), key);
        delegations.roles.push(DelegatedRole {
            name: name.to_string(),
            keyids: vec![keyid],
            threshold: version(1),
            paths,
            terminating,
        });

        let child = sign_role(targets_payload(1, days(30)), &[&keypair]);
        self.targets.insert(name.to_string(), child);
        self.delegated_keys.insert(name.to_string(), keypair);
    }

    /// Re-signs every targets role, then publishes a new snapshot and
    /// timestamp describing the current repository state.
    pub fn publish(&mut self) {
        let mut meta = Vec::new();
        for (name, targets) in &mut self.targets {
            let signer = if name == "targets" {
                &self.targets_key
            } else {
                &self.delegated_keys[name]
            };
            resign(targets, signer);
            meta.push((format!("{name}.json"), meta_file(targets.signed.version.get())));
        }

        let snapshot_version = self.snapshot.signed.version.get() + 1;
        let mut snapshot = snapshot_payload(snapshot_version, days(30), Vec::new());
        for (name, entry) in meta {
            snapshot.meta.insert(name, entry);
        }
        self.snapshot = sign_role(snapshot, &[&self.snapshot_key]);

        let timestamp = timestamp_payload(
            self.timestamp.signed.version.get() + 1,
            days(7),
            meta_file(snapshot_version),
        );
        self.timestamp = sign_role(timestamp, &[&self.timestamp_key]);
    }

    /// An [`InMemoryFetcher`] serving this repository's current state under
    /// the standard base URLs.
    pub fn fetcher(&self) -> InMemoryFetcher {
        let metadata_base = Url::parse(METADATA_BASE).unwrap();
        let target_base = Url::parse(TARGET_BASE).unwrap();
        let mut files = HashMap::new();

        let mut add = |url: Url, data: Vec<u8>| {
            files.insert(url.to_string(), data);
        };

        for root in &self.root_history {
            let data = root.to_bytes(true).unwrap();
            let name = format!("{}.root.json", root.signed.version);
            add(metadata_base.join(&name).unwrap(), data);
        }
        add(
            metadata_base.join("root.json").unwrap(),
            self.root.to_bytes(true).unwrap(),
        );
        add(
            metadata_base.join("timestamp.json").unwrap(),
            self.timestamp.to_bytes(true).unwrap(),
        );
        let snapshot_data = self.snapshot.to_bytes(true).unwrap();
        add(
            metadata_base.join("snapshot.json").unwrap(),
            snapshot_data.clone(),
        );
        add(
            metadata_base
                .join(&format!("{}.snapshot.json", self.snapshot.signed.version))
                .unwrap(),
            snapshot_data,
        );
        for (name, targets) in &self.targets {
            let data = targets.to_bytes(true).unwrap();
            add(
                metadata_base.join(&format!("{name}.json")).unwrap(),
                data.clone(),
            );
            add(
                metadata_base
                    .join(&format!("{}.{name}.json", targets.signed.version))
                    .unwrap(),
                data,
            );
        }
        for (path, data) in &self.target_files {
            add(target_base.join(path).unwrap(), data.clone());
            // The hash-prefixed name used in consistent-snapshot mode.
            let digest = hex::encode(ring::digest::digest(&ring::digest::SHA256, data));
            let prefixed = match path.rsplit_once('/') {
                Some((dir, name)) => format!("{dir}/{digest}.{name}"),
                None => format!("{digest}.{path}"),
            };
            add(target_base.join(&prefixed).unwrap(), data.clone());
        }

        InMemoryFetcher { files }
    }

    /// Writes the initial trusted root into a client's metadata directory.
    pub fn write_trusted_root(&self, metadata_dir: &Path) {
        self.root_history[0]
            .to_file(metadata_dir.join("root.json"), true)
            .unwrap();
    }

    /// An updater bootstrapped from this repository's initial root.
    pub fn updater(&self, metadata_dir: &Path, target_dir: &Path) -> Updater {
        self.write_trusted_root(metadata_dir);
        Updater::new(
            metadata_dir,
            Url::parse(METADATA_BASE).unwrap(),
            Some(target_dir.to_path_buf()),
            Some(Url::parse(TARGET_BASE).unwrap()),
            Box::new(self.fetcher()),
            UpdaterConfig::default(),
        )
        .unwrap()
    }
}

/// A [`Fetcher`] backed by a map of URL → bytes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFetcher {
    pub files: HashMap<String, Vec<u8>>,
}

impl Fetcher for InMemoryFetcher {
    fn fetch(&self, url: &Url, max_length: u64) -> Result<Vec<u8>, FetchError> {
        let data = self
            .files
            .get(url.as_str())
            .ok_or_else(|| FetchError::transport(url, "file not found"))?;
        if data.len() as u64 > max_length {
            return Err(FetchError::LengthMismatch {
                url: url.to_string(),
                max_length,
            });
        }
        Ok(data.clone())
    }
}
