//! The client update workflow: ordered metadata refresh, target resolution
//! through the delegation graph, and verified target downloads.

use crate::config::UpdaterConfig;
use crate::datastore::Datastore;
use crate::error::{self, Error, Result};
use crate::fetcher::Fetcher;
use crate::schema::{Signed, Target, Targets, ROOT, SNAPSHOT, TARGETS, TIMESTAMP};
use crate::trusted::TrustedMetadataSet;
use log::debug;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use url::Url;

/// Characters to escape when turning a role name or target path into a cache
/// filename. `.`, `_` and `-` are safe everywhere we write.
const CHARACTERS_TO_ESCAPE: AsciiSet = NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'_')
    .remove(b'-');

/// URL-encodes a role name or target path for use as a filename.
pub(crate) fn encode_filename(name: &str) -> String {
    utf8_percent_encode(name, &CHARACTERS_TO_ESCAPE).to_string()
}

/// Implements the TUF client workflow: refresh the chain of metadata roles
/// from an untrusted remote repository, resolve targets through the
/// delegation graph, and download and verify target files.
///
/// The updater owns its local metadata cache directory exclusively while it
/// runs; concurrent updaters over the same directory are not supported.
#[derive(Debug)]
pub struct Updater {
    metadata_base_url: Url,
    target_dir: Option<PathBuf>,
    target_base_url: Option<Url>,
    trusted: TrustedMetadataSet,
    config: UpdaterConfig,
    fetcher: Box<dyn Fetcher>,
    cache: Datastore,
}

impl Updater {
    /// Creates a new `Updater` and loads the trusted root metadata from
    /// `root.json` in `metadata_dir`.
    ///
    /// `target_dir` and `target_base_url` are only required for
    /// [`Self::download_target`] and [`Self::find_cached_target`] and may be
    /// omitted for metadata-only use.
    pub fn new<P: AsRef<Path>>(
        metadata_dir: P,
        metadata_base_url: Url,
        target_dir: Option<PathBuf>,
        target_base_url: Option<Url>,
        fetcher: Box<dyn Fetcher>,
        config: UpdaterConfig,
    ) -> Result<Self> {
        let cache = Datastore::new(metadata_dir)?;
        let root_bytes = cache
            .read(ROOT)?
            .context(error::MissingTrustedRootSnafu { path: cache.file_path(ROOT) })?;
        let trusted = TrustedMetadataSet::new(&root_bytes)?;
        Ok(Self {
            metadata_base_url: ensure_trailing_slash(metadata_base_url),
            target_dir,
            target_base_url: target_base_url.map(ensure_trailing_slash),
            trusted,
            config,
            fetcher,
            cache,
        })
    }

    /// The trusted metadata set, for inspecting what the updater currently
    /// trusts.
    pub fn trusted(&self) -> &TrustedMetadataSet {
        &self.trusted
    }

    /// Refreshes the top-level metadata in the prescribed order
    /// (root → timestamp → snapshot → targets), persisting each validated
    /// role to the local cache.
    ///
    /// Refresh happens at most once per `Updater`: it runs implicitly on the
    /// first [`Self::get_target_info`] call if it has not been called
    /// explicitly. Delegated targets metadata is not refreshed here; it is
    /// loaded on demand during target resolution.
    pub fn refresh(&mut self) -> Result<()> {
        self.load_root()?;
        self.load_timestamp()?;
        self.load_snapshot()?;
        self.load_targets(TARGETS, ROOT)?;
        Ok(())
    }

    /// Returns the target descriptor for `target_path`, refreshing first if
    /// needed, then walking the delegation graph in pre-order.
    ///
    /// As a side effect this downloads and verifies all the delegated targets
    /// metadata it needs to answer the lookup.
    pub fn get_target_info(&mut self, target_path: &str) -> Result<Target> {
        if self.trusted.targets(TARGETS).is_none() {
            self.refresh()?;
        }
        self.pre_order_dfs(target_path)
    }

    /// Checks whether a local file already holds the up-to-date bytes of
    /// `target`, returning its path if so.
    pub fn find_cached_target(
        &self,
        target: &Target,
        filepath: Option<&Path>,
    ) -> Result<PathBuf> {
        let path = match filepath {
            Some(path) => path.to_path_buf(),
            None => self.target_file_path(target)?,
        };
        let data = std::fs::read(&path).context(error::FileReadSnafu { path: &path })?;
        target
            .verify_length_hashes(&data)
            .context(error::LengthOrHashesSnafu { what: target.path.as_str() })?;
        Ok(path)
    }

    /// Downloads the target file described by `target`, verifies its length
    /// and every declared hash, writes it to `filepath` (or a generated path
    /// under the target directory), and returns the written path.
    pub fn download_target(
        &self,
        target: &Target,
        filepath: Option<&Path>,
        target_base_url: Option<&Url>,
    ) -> Result<PathBuf> {
        let path = match filepath {
            Some(path) => path.to_path_buf(),
            None => self.target_file_path(target)?,
        };
        let base = match target_base_url {
            Some(url) => ensure_trailing_slash(url.clone()),
            None => self
                .target_base_url
                .clone()
                .context(error::NoTargetBaseUrlSnafu)?,
        };

        let mut target_path = target.path.clone();
        if self.trusted.root().signed.consistent_snapshot && self.config.prefix_targets_with_hash {
            let digest = target
                .hashes
                .values()
                .next()
                .context(error::MissingTargetHashesSnafu { target: target.path.as_str() })?;
            target_path = hash_prefixed_path(&target_path, &hex::encode(digest));
        }
        let url = base
            .join(&target_path)
            .context(error::JoinUrlSnafu { path: target_path })?;

        let data = self
            .fetcher
            .fetch(&url, target.length)
            .context(error::FetchSnafu)?;
        target
            .verify_length_hashes(&data)
            .context(error::LengthOrHashesSnafu { what: target.path.as_str() })?;
        std::fs::write(&path, &data).context(error::FileWriteSnafu { path: &path })?;
        debug!("Downloaded target {}", target.path);
        Ok(path)
    }

    /// Sequentially fetches and installs every newer root version available
    /// on the remote. A fetch failure means the trusted root is the newest
    /// available; the final root must not be expired.
    fn load_root(&mut self) -> Result<()> {
        let lower = self.trusted.root().signed.version.get() + 1;
        let upper = lower + self.config.max_root_rotations;
        for next_version in lower..upper {
            let data = match self.download_metadata(
                ROOT,
                self.config.root_max_length,
                Some(next_version),
            ) {
                Ok(data) => data,
                Err(err) => {
                    debug!("Root v{} not available: {}", next_version, err);
                    break;
                }
            };
            self.trusted.update_root(&data)?;
            self.cache.write(ROOT, &data)?;
        }
        ensure!(
            self.trusted.root().signed.expires > self.trusted.reference_time(),
            error::ExpiredMetadataSnafu { role: ROOT }
        );
        Ok(())
    }

    /// Loads local and remote timestamp metadata. The local copy is offered
    /// to the trusted set first so its versions seed the rollback checks. An
    /// expired local timestamp is still installed and the remote attempt
    /// runs; any other failure of the local copy aborts the refresh.
    fn load_timestamp(&mut self) -> Result<()> {
        match self.cache.read(TIMESTAMP) {
            Ok(Some(data)) => match self.trusted.update_timestamp(&data) {
                Ok(_) => debug!("Loaded timestamp from local cache"),
                // Installed regardless; the remote may hold a fresher one.
                Err(Error::ExpiredMetadata { .. }) => {
                    debug!("Local timestamp is verified, but expired");
                }
                Err(err) => return Err(err),
            },
            Ok(None) => {}
            Err(err) => debug!("Local timestamp unreadable: {}", err),
        }

        let data = self.download_metadata(TIMESTAMP, self.config.timestamp_max_length, None)?;
        match self.trusted.update_timestamp(&data)? {
            Some(_) => self.cache.write(TIMESTAMP, &data)?,
            // Same version as the trusted timestamp; nothing to persist.
            None => debug!("Remote timestamp is unchanged"),
        }
        Ok(())
    }

    /// Loads local, and if needed remote, snapshot metadata. A valid local
    /// snapshot is used as-is.
    fn load_snapshot(&mut self) -> Result<()> {
        if let Ok(Some(data)) = self.cache.read(SNAPSHOT) {
            match self.trusted.update_snapshot(&data, true) {
                Ok(_) => {
                    debug!("Local snapshot is valid: not downloading a new one");
                    return Ok(());
                }
                Err(err) => debug!("Local snapshot not used: {}", err),
            }
        }

        let timestamp = self
            .trusted
            .timestamp()
            .context(error::UpdateOrderSnafu { reason: "cannot load snapshot before timestamp" })?;
        let meta = timestamp
            .signed
            .snapshot_meta()
            .context(error::MetaMissingSnafu { name: "snapshot.json" })?;
        let length = meta.length.unwrap_or(self.config.snapshot_max_length);
        let version = self.consistent_version(meta.version.get());

        let data = self.download_metadata(SNAPSHOT, length, version)?;
        self.trusted.update_snapshot(&data, false)?;
        self.cache.write(SNAPSHOT, &data)?;
        Ok(())
    }

    /// Loads local, and if needed remote, targets metadata for `role_name`,
    /// verified against its parent. Returns the trusted instance; a role
    /// already in the trusted set is not loaded again.
    fn load_targets(&mut self, role_name: &str, parent_name: &str) -> Result<&Signed<Targets>> {
        if self.trusted.targets(role_name).is_none() {
            if let Ok(Some(data)) = self.cache.read(role_name) {
                match self
                    .trusted
                    .update_delegated_targets(&data, role_name, parent_name)
                {
                    Ok(_) => debug!("Local {} is valid: not downloading a new one", role_name),
                    Err(err) => debug!("Local {} not used: {}", role_name, err),
                }
            }
        }

        if self.trusted.targets(role_name).is_none() {
            let snapshot = self
                .trusted
                .snapshot()
                .context(error::UpdateOrderSnafu { reason: "cannot load targets before snapshot" })?;
            let meta_name = format!("{role_name}.json");
            let meta = snapshot
                .signed
                .meta
                .get(&meta_name)
                .context(error::MetaMissingSnafu { name: meta_name.as_str() })?;
            let length = meta.length.unwrap_or(self.config.targets_max_length);
            let version = self.consistent_version(meta.version.get());

            let data = self.download_metadata(role_name, length, version)?;
            self.trusted
                .update_delegated_targets(&data, role_name, parent_name)?;
            self.cache.write(role_name, &data)?;
        }

        self.trusted
            .targets(role_name)
            .context(error::UnknownRoleSnafu { name: role_name })
    }

    /// Interrogates the tree of target delegations in order of appearance
    /// (which implicitly orders trustworthiness) and returns the matching
    /// target found in the most trusted role.
    fn pre_order_dfs(&mut self, target_path: &str) -> Result<Target> {
        // A (role, parent) pair is needed to load and verify each delegated
        // targets metadata.
        let mut to_visit = vec![(TARGETS.to_string(), ROOT.to_string())];
        let mut visited: HashSet<String> = HashSet::new();

        while visited.len() < self.config.max_delegations {
            let Some((role, parent)) = to_visit.pop() else {
                break;
            };
            if visited.contains(&role) {
                debug!("Skipping visited role {}", role);
                continue;
            }

            let targets = self.load_targets(&role, &parent)?;
            if let Some(target) = targets.signed.targets.get(target_path) {
                debug!("Found target in role {}", role);
                let mut target = target.clone();
                target.path = target_path.to_string();
                return Ok(target);
            }

            let mut children = Vec::new();
            let mut terminated = false;
            if let Some(delegations) = &targets.signed.delegations {
                for child in delegations.roles_for_target(target_path) {
                    debug!("Adding child role {}", child.name);
                    children.push((child.name.clone(), role.clone()));
                    if child.terminating {
                        debug!("Delegation {} terminates the search", child.name);
                        terminated = true;
                        break;
                    }
                }
            }

            visited.insert(role);
            if terminated {
                to_visit.clear();
            }
            // Push children in reverse declaration order; popping then yields
            // them in declaration order.
            children.reverse();
            to_visit.append(&mut children);
        }

        if !to_visit.is_empty() {
            debug!(
                "{} roles left to visit, but allowed at most {} delegations",
                to_visit.len(),
                self.config.max_delegations
            );
        }
        error::TargetNotFoundSnafu { target: target_path }.fail()
    }

    /// Builds a metadata URL, version-prefixed when `version` is given, and
    /// downloads it bounded by `max_length`.
    fn download_metadata(
        &self,
        role_name: &str,
        max_length: u64,
        version: Option<u64>,
    ) -> Result<Vec<u8>> {
        let filename = match version {
            None => format!("{}.json", encode_filename(role_name)),
            Some(version) => format!("{}.{}.json", version, encode_filename(role_name)),
        };
        let url = self
            .metadata_base_url
            .join(&filename)
            .context(error::JoinUrlSnafu { path: filename })?;
        self.fetcher
            .fetch(&url, max_length)
            .context(error::FetchSnafu)
    }

    /// The version prefix for metadata URLs: set only when the repository
    /// uses consistent snapshots.
    fn consistent_version(&self, version: u64) -> Option<u64> {
        self.trusted
            .root()
            .signed
            .consistent_snapshot
            .then_some(version)
    }

    /// The local file path for a target: its URL-encoded target path under
    /// the target directory.
    fn target_file_path(&self, target: &Target) -> Result<PathBuf> {
        let dir = self.target_dir.as_ref().context(error::NoTargetDirSnafu)?;
        Ok(dir.join(encode_filename(&target.path)))
    }
}

/// Rewrites `dir/name` into `dir/<digest>.name` for consistent-snapshot
/// target URLs. A path without a directory component becomes
/// `<digest>.name`.
fn hash_prefixed_path(path: &str, digest: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, name)) => format!("{dir}/{digest}.{name}"),
        None => format!("{digest}.{path}"),
    }
}

/// Ensures a base URL ends with a slash so joins append instead of replacing
/// the last path segment.
fn ensure_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
