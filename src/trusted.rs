//! The trusted metadata set: the state machine that accepts candidate
//! metadata and mutates a trusted snapshot of the four top-level roles plus
//! delegated targets.
//!
//! Every update operation verifies the candidate completely before replacing
//! the trusted instance; on failure the prior trusted state is untouched. The
//! reference time used for every expiry check is captured once at
//! construction, so the checks are consistent across a refresh cycle.

use crate::error::{self, Result};
use crate::schema::{
    Root, Signed, Snapshot, Targets, Timestamp, ROOT, SNAPSHOT, SPECIFICATION_VERSION, TARGETS,
    TIMESTAMP,
};
use chrono::{DateTime, Utc};
use log::debug;
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// The currently-trusted instances of each metadata role.
///
/// The set proceeds root → timestamp → snapshot → targets → delegated
/// targets; each update operation requires its predecessors to have been
/// installed.
#[derive(Debug)]
pub struct TrustedMetadataSet {
    root: Signed<Root>,
    timestamp: Option<Signed<Timestamp>>,
    snapshot: Option<Signed<Snapshot>>,
    targets: HashMap<String, Signed<Targets>>,
    reference_time: DateTime<Utc>,
}

impl TrustedMetadataSet {
    /// Creates a trusted set from root metadata the caller already trusts,
    /// using the current wall clock as the reference time.
    ///
    /// The root is self-verified: its signatures must meet its own `root`
    /// role threshold. An expired root is rejected.
    pub fn new(root_bytes: &[u8]) -> Result<Self> {
        Self::new_at(root_bytes, Utc::now())
    }

    /// Creates a trusted set with an explicit reference time.
    pub fn new_at(root_bytes: &[u8], reference_time: DateTime<Utc>) -> Result<Self> {
        let root = Signed::<Root>::from_bytes(root_bytes)
            .context(error::ParseMetadataSnafu { role: ROOT })?;
        check_spec_version(ROOT, &root.signed.spec_version)?;
        root.signed
            .validate()
            .context(error::VerifyMetadataSnafu { role: ROOT })?;
        root.signed
            .verify_role(&root)
            .context(error::VerifyMetadataSnafu { role: ROOT })?;
        ensure!(
            root.signed.expires > reference_time,
            error::ExpiredMetadataSnafu { role: ROOT }
        );
        debug!("Loaded trusted root v{}", root.signed.version);
        Ok(Self {
            root,
            timestamp: None,
            snapshot: None,
            targets: HashMap::new(),
            reference_time,
        })
    }

    /// The trusted root metadata.
    pub fn root(&self) -> &Signed<Root> {
        &self.root
    }

    /// The trusted timestamp metadata, if installed.
    pub fn timestamp(&self) -> Option<&Signed<Timestamp>> {
        self.timestamp.as_ref()
    }

    /// The trusted snapshot metadata, if installed.
    pub fn snapshot(&self) -> Option<&Signed<Snapshot>> {
        self.snapshot.as_ref()
    }

    /// The trusted targets metadata for `role_name`, if installed. The
    /// top-level role is named `targets`.
    pub fn targets(&self, role_name: &str) -> Option<&Signed<Targets>> {
        self.targets.get(role_name)
    }

    /// The reference time all expiry checks are made against.
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.reference_time
    }

    /// Verifies and installs the next root, which must carry exactly the
    /// successor version and verify against both the current root's keys and
    /// its own.
    ///
    /// Expiry is deliberately not checked here: an expired intermediate root
    /// must not stop the client from walking forward to the latest one.
    pub fn update_root(&mut self, data: &[u8]) -> Result<&Signed<Root>> {
        let new_root = Signed::<Root>::from_bytes(data)
            .context(error::ParseMetadataSnafu { role: ROOT })?;
        check_spec_version(ROOT, &new_root.signed.spec_version)?;

        let expected = self.root.signed.version.get() + 1;
        let found = new_root.signed.version.get();
        ensure!(
            found == expected,
            error::BadVersionNumberSnafu { role: ROOT, expected, found }
        );

        self.root
            .signed
            .verify_role(&new_root)
            .context(error::VerifyMetadataSnafu { role: ROOT })?;
        new_root
            .signed
            .verify_role(&new_root)
            .context(error::VerifyMetadataSnafu { role: ROOT })?;
        new_root
            .signed
            .validate()
            .context(error::VerifyMetadataSnafu { role: ROOT })?;

        self.root = new_root;
        debug!("Updated root v{}", found);
        Ok(&self.root)
    }

    /// Verifies and installs a new timestamp.
    ///
    /// Returns `Ok(None)` without changing state when the candidate's version
    /// equals the trusted version: the caller should discard the candidate.
    /// An expired candidate is installed first and the expiry reported
    /// afterwards, so that a subsequent root update remains possible.
    pub fn update_timestamp(&mut self, data: &[u8]) -> Result<Option<&Signed<Timestamp>>> {
        ensure!(
            self.snapshot.is_none(),
            error::UpdateOrderSnafu { reason: "cannot update timestamp after snapshot" }
        );
        ensure!(
            self.root.signed.expires > self.reference_time,
            error::ExpiredMetadataSnafu { role: ROOT }
        );

        let new_timestamp = Signed::<Timestamp>::from_bytes(data)
            .context(error::ParseMetadataSnafu { role: TIMESTAMP })?;
        check_spec_version(TIMESTAMP, &new_timestamp.signed.spec_version)?;
        self.root
            .signed
            .verify_role(&new_timestamp)
            .context(error::VerifyMetadataSnafu { role: TIMESTAMP })?;
        let new_snapshot_version = new_timestamp
            .signed
            .snapshot_meta()
            .context(error::MetaMissingSnafu { name: "snapshot.json" })?
            .version
            .get();

        if let Some(current) = &self.timestamp {
            let trusted_version = current.signed.version.get();
            let found = new_timestamp.signed.version.get();
            ensure!(
                found >= trusted_version,
                error::BadVersionNumberSnafu {
                    role: TIMESTAMP,
                    expected: trusted_version,
                    found,
                }
            );
            if found == trusted_version {
                debug!("Timestamp v{} is unchanged", found);
                return Ok(None);
            }
            let trusted_snapshot_version = current
                .signed
                .snapshot_meta()
                .context(error::MetaMissingSnafu { name: "snapshot.json" })?
                .version
                .get();
            ensure!(
                new_snapshot_version >= trusted_snapshot_version,
                error::BadVersionNumberSnafu {
                    role: SNAPSHOT,
                    expected: trusted_snapshot_version,
                    found: new_snapshot_version,
                }
            );
        }

        let expires = new_timestamp.signed.expires;
        let installed = self.timestamp.insert(new_timestamp);
        debug!("Updated timestamp v{}", installed.signed.version);
        ensure!(
            expires > self.reference_time,
            error::ExpiredMetadataSnafu { role: TIMESTAMP }
        );
        Ok(Some(installed))
    }

    /// Verifies and installs a new snapshot, bounded by the trusted
    /// timestamp's declared length and hashes.
    ///
    /// `trusted` marks bytes re-loaded from the local cache: the version and
    /// rollback rules still apply, but expiry is not checked, so a stale
    /// snapshot can seed rollback protection before the remote fetch.
    pub fn update_snapshot(&mut self, data: &[u8], trusted: bool) -> Result<&Signed<Snapshot>> {
        let timestamp = self
            .timestamp
            .as_ref()
            .context(error::UpdateOrderSnafu { reason: "cannot update snapshot before timestamp" })?;
        ensure!(
            timestamp.signed.expires > self.reference_time,
            error::ExpiredMetadataSnafu { role: TIMESTAMP }
        );
        let meta = timestamp
            .signed
            .snapshot_meta()
            .context(error::MetaMissingSnafu { name: "snapshot.json" })?;
        meta.verify_length_hashes(data)
            .context(error::LengthOrHashesSnafu { what: "snapshot.json" })?;
        let expected = meta.version.get();

        let new_snapshot = Signed::<Snapshot>::from_bytes(data)
            .context(error::ParseMetadataSnafu { role: SNAPSHOT })?;
        check_spec_version(SNAPSHOT, &new_snapshot.signed.spec_version)?;
        self.root
            .signed
            .verify_role(&new_snapshot)
            .context(error::VerifyMetadataSnafu { role: SNAPSHOT })?;

        let found = new_snapshot.signed.version.get();
        ensure!(
            found == expected,
            error::BadVersionNumberSnafu { role: SNAPSHOT, expected, found }
        );

        // Rollback guard: every targets entry we already trust must persist
        // with a version at least as new.
        if let Some(current) = &self.snapshot {
            for (name, prior) in &current.signed.meta {
                let entry = new_snapshot
                    .signed
                    .meta
                    .get(name)
                    .context(error::MetaMissingSnafu { name: name.as_str() })?;
                ensure!(
                    entry.version >= prior.version,
                    error::BadVersionNumberSnafu {
                        role: name.as_str(),
                        expected: prior.version.get(),
                        found: entry.version.get(),
                    }
                );
            }
        }

        let expires = new_snapshot.signed.expires;
        let installed = self.snapshot.insert(new_snapshot);
        debug!("Updated snapshot v{}", installed.signed.version);
        if !trusted {
            ensure!(
                expires > self.reference_time,
                error::ExpiredMetadataSnafu { role: SNAPSHOT }
            );
        }
        Ok(installed)
    }

    /// Verifies and installs the top-level targets role. Equivalent to
    /// [`Self::update_delegated_targets`] with the root as delegator.
    pub fn update_targets(&mut self, data: &[u8]) -> Result<&Signed<Targets>> {
        self.update_delegated_targets(data, TARGETS, ROOT)
    }

    /// Verifies and installs a targets role, delegated either by the root
    /// (`parent_name = "root"`, for the top-level role) or by an
    /// already-trusted targets role's delegation record.
    pub fn update_delegated_targets(
        &mut self,
        data: &[u8],
        role_name: &str,
        parent_name: &str,
    ) -> Result<&Signed<Targets>> {
        let snapshot = self
            .snapshot
            .as_ref()
            .context(error::UpdateOrderSnafu { reason: "cannot load targets before snapshot" })?;
        ensure!(
            snapshot.signed.expires > self.reference_time,
            error::ExpiredMetadataSnafu { role: SNAPSHOT }
        );
        // The snapshot must still be the one the trusted timestamp points at.
        if let Some(timestamp) = &self.timestamp {
            if let Some(meta) = timestamp.signed.snapshot_meta() {
                ensure!(
                    snapshot.signed.version == meta.version,
                    error::BadVersionNumberSnafu {
                        role: SNAPSHOT,
                        expected: meta.version.get(),
                        found: snapshot.signed.version.get(),
                    }
                );
            }
        }

        let meta_name = format!("{role_name}.json");
        let meta = snapshot
            .signed
            .meta
            .get(&meta_name)
            .context(error::MetaMissingSnafu { name: meta_name.as_str() })?;
        meta.verify_length_hashes(data)
            .context(error::LengthOrHashesSnafu { what: meta_name.as_str() })?;
        let expected = meta.version.get();

        let new_targets = Signed::<Targets>::from_bytes(data)
            .context(error::ParseMetadataSnafu { role: role_name })?;
        check_spec_version(role_name, &new_targets.signed.spec_version)?;

        if parent_name == ROOT {
            self.root
                .signed
                .verify_role(&new_targets)
                .context(error::VerifyMetadataSnafu { role: role_name })?;
        } else {
            let parent = self
                .targets
                .get(parent_name)
                .context(error::UnknownRoleSnafu { name: parent_name })?;
            parent
                .signed
                .verify_delegated_role(role_name, &new_targets)
                .context(error::VerifyMetadataSnafu { role: role_name })?;
        }

        let found = new_targets.signed.version.get();
        ensure!(
            found == expected,
            error::BadVersionNumberSnafu { role: role_name, expected, found }
        );
        ensure!(
            new_targets.signed.expires > self.reference_time,
            error::ExpiredMetadataSnafu { role: role_name }
        );

        debug!("Updated {} v{}", role_name, found);
        match self.targets.entry(role_name.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.insert(new_targets);
                Ok(entry.into_mut())
            }
            Entry::Vacant(entry) => Ok(entry.insert(new_targets)),
        }
    }
}

/// Candidate metadata must share the major version of the specification this
/// implementation supports.
fn check_spec_version(role: &str, spec_version: &str) -> Result<()> {
    let supported = SPECIFICATION_VERSION.split('.').next().unwrap_or_default();
    let major = spec_version.split('.').next().unwrap_or_default();
    ensure!(
        major == supported,
        error::SpecVersionSnafu { role, spec_version }
    );
    Ok(())
}
