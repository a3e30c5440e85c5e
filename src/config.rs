//! Configuration for the updater workflow.

/// The recognized options of an [`Updater`](crate::Updater) and their
/// defaults. The length limits bound downloads whose size the repository
/// metadata does not (or cannot yet) declare.
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// Upper bound on sequential root updates during a single refresh.
    pub max_root_rotations: u64,

    /// Upper bound on roles visited while walking the delegation graph.
    pub max_delegations: usize,

    /// Byte limit for a root metadata download.
    pub root_max_length: u64,

    /// Byte limit for a timestamp metadata download.
    pub timestamp_max_length: u64,

    /// Byte limit for a snapshot metadata download, used when the timestamp
    /// metadata does not declare the snapshot's length.
    pub snapshot_max_length: u64,

    /// Byte limit for a targets metadata download, used when the snapshot
    /// metadata does not declare the targets role's length.
    pub targets_max_length: u64,

    /// When the repository uses consistent snapshots, download targets from
    /// hash-prefixed URLs (`dir/<hex-digest>.name`).
    pub prefix_targets_with_hash: bool,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            max_root_rotations: 32,
            max_delegations: 32,
            root_max_length: 512_000,
            timestamp_max_length: 16_384,
            snapshot_max_length: 2_000_000,
            targets_max_length: 5_000_000,
            prefix_targets_with_hash: true,
        }
    }
}
