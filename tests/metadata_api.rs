//! Tests for the metadata model: parsing, serialization round-trips, and
//! signature handling.

mod test_utils;

use ring::rand::SystemRandom;
use staunch::schema::{Role, RoleType, Root, Signed, Snapshot, Targets, Timestamp};
use test_utils::RepoSimulator;

/// Each role parser chokes correctly on an unknown metadata type.
#[test]
fn unknown_type_rejected() {
    let bad_metadata = br#"{"signed": {"_type": "bad-metadata"}}"#;

    let err = Signed::<Root>::from_bytes(bad_metadata).unwrap_err();
    assert!(
        err.to_string()
            .contains("expected metadata type root, got - bad-metadata"),
        "{err}"
    );
    let err = Signed::<Snapshot>::from_bytes(bad_metadata).unwrap_err();
    assert!(
        err.to_string()
            .contains("expected metadata type snapshot, got - bad-metadata"),
        "{err}"
    );
    let err = Signed::<Targets>::from_bytes(bad_metadata).unwrap_err();
    assert!(
        err.to_string()
            .contains("expected metadata type targets, got - bad-metadata"),
        "{err}"
    );
    let err = Signed::<Timestamp>::from_bytes(bad_metadata).unwrap_err();
    assert!(
        err.to_string()
            .contains("expected metadata type timestamp, got - bad-metadata"),
        "{err}"
    );
}

/// The same applies when reading from a file.
#[test]
fn unknown_type_rejected_from_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("bad-metadata.json");
    std::fs::write(&path, br#"{"signed": {"_type": "bad-metadata"}}"#).unwrap();

    let err = Signed::<Root>::from_file(&path).unwrap_err();
    assert!(
        err.to_string()
            .contains("expected metadata type root, got - bad-metadata"),
        "{err}"
    );
}

/// Malformed JSON is a parse error, not a type mismatch.
#[test]
fn malformed_json_rejected() {
    let err = Signed::<Root>::from_bytes(b"{ this is not json").unwrap_err();
    assert!(err.to_string().contains("Failed to parse"), "{err}");
}

/// A version below 1 cannot be parsed.
#[test]
fn version_zero_rejected() {
    let sim = RepoSimulator::new();
    let mut value: serde_json::Value =
        serde_json::from_slice(&sim.root_bytes()).unwrap();
    value["signed"]["version"] = serde_json::Value::from(0u64);
    let data = serde_json::to_vec(&value).unwrap();
    assert!(Signed::<Root>::from_bytes(&data).is_err());
}

/// Write to a file, read it back, and compare the serialized forms for every
/// role.
#[test]
fn read_write_read_compare() {
    let sim = RepoSimulator::new();
    let dir = tempfile::TempDir::new().unwrap();

    let path = dir.path().join("root.json");
    sim.root.to_file(&path, true).unwrap();
    let root2 = Signed::<Root>::from_file(&path).unwrap();
    assert_eq!(sim.root.to_bytes(true).unwrap(), root2.to_bytes(true).unwrap());

    let path = dir.path().join("timestamp.json");
    sim.timestamp.to_file(&path, true).unwrap();
    let timestamp2 = Signed::<Timestamp>::from_file(&path).unwrap();
    assert_eq!(
        sim.timestamp.to_bytes(true).unwrap(),
        timestamp2.to_bytes(true).unwrap()
    );

    let path = dir.path().join("snapshot.json");
    sim.snapshot.to_file(&path, true).unwrap();
    let snapshot2 = Signed::<Snapshot>::from_file(&path).unwrap();
    assert_eq!(
        sim.snapshot.to_bytes(true).unwrap(),
        snapshot2.to_bytes(true).unwrap()
    );

    let path = dir.path().join("targets.json");
    let targets = &sim.targets["targets"];
    targets.to_file(&path, true).unwrap();
    let targets2 = Signed::<Targets>::from_file(&path).unwrap();
    assert_eq!(targets.to_bytes(true).unwrap(), targets2.to_bytes(true).unwrap());
}

/// Parsing and re-serializing canonical bytes reproduces them, and parsing a
/// serialized value reproduces the value.
#[test]
fn canonical_round_trip() {
    let sim = RepoSimulator::new();

    let canonical = sim.root.to_bytes(false).unwrap();
    let parsed = Signed::<Root>::from_bytes(&canonical).unwrap();
    assert_eq!(parsed, sim.root);
    assert_eq!(parsed.to_bytes(false).unwrap(), canonical);

    // The indented form parses back to the same value too.
    let pretty = sim.root.to_bytes(true).unwrap();
    let parsed = Signed::<Root>::from_bytes(&pretty).unwrap();
    assert_eq!(parsed, sim.root);
}

/// Verify a signature against the correct role key, and confirm it fails
/// against another role's key.
#[test]
fn signature_verification() {
    let sim = RepoSimulator::new();
    let root = &sim.root.signed;

    let targets_keyid = &root.roles[&RoleType::Targets].keyids[0];
    let snapshot_keyid = &root.roles[&RoleType::Snapshot].keyids[0];

    let targets = &sim.targets["targets"];
    assert_eq!(targets.signatures.len(), 1);
    let canonical = targets.signed.canonical_form().unwrap();
    let signature = &targets.signatures[0];
    assert_eq!(&signature.keyid, targets_keyid);

    let targets_key = &root.keys[targets_keyid];
    assert!(targets_key.verify(&canonical, &signature.sig));

    let snapshot_key = &root.keys[snapshot_keyid];
    assert!(!snapshot_key.verify(&canonical, &signature.sig));
}

/// Appending a signature with an unrelated key grows the signatures list and
/// both signatures verify against their own keys.
#[test]
fn sign_appends() {
    let sim = RepoSimulator::new();
    let rng = SystemRandom::new();
    let mut targets = sim.targets["targets"].clone();
    let canonical = targets.signed.canonical_form().unwrap();

    let appended = targets.sign(&sim.snapshot_key, &rng).unwrap();
    assert_eq!(targets.signatures.len(), 2);

    let root = &sim.root.signed;
    let targets_keyid = &root.roles[&RoleType::Targets].keyids[0];
    let snapshot_keyid = &root.roles[&RoleType::Snapshot].keyids[0];
    assert_eq!(&appended.keyid, snapshot_keyid);

    assert!(root.keys[targets_keyid].verify(&canonical, &targets.signatures[0].sig));
    assert!(root.keys[snapshot_keyid].verify(&canonical, &appended.sig));
}

/// Clearing signatures and re-signing leaves exactly one signature, for the
/// new key.
#[test]
fn clear_and_resign() {
    let sim = RepoSimulator::new();
    let rng = SystemRandom::new();
    let mut targets = sim.targets["targets"].clone();
    let canonical = targets.signed.canonical_form().unwrap();

    targets.clear_signatures();
    assert!(targets.signatures.is_empty());

    let signature = targets.sign(&sim.timestamp_key, &rng).unwrap();
    assert_eq!(targets.signatures.len(), 1);

    let root = &sim.root.signed;
    let timestamp_keyid = &root.roles[&RoleType::Timestamp].keyids[0];
    assert_eq!(&signature.keyid, timestamp_keyid);
    assert!(root.keys[timestamp_keyid].verify(&canonical, &signature.sig));
}

/// A key's ID is the SHA-256 of its canonical form and matches the ID it is
/// registered under in root metadata.
#[test]
fn key_id_matches_registration() {
    let sim = RepoSimulator::new();
    for (keyid, key) in &sim.root.signed.keys {
        assert_eq!(keyid, key.key_id().unwrap());
    }
}
