//! The local metadata cache: the most recently validated bytes of each role,
//! written atomically.

use crate::error::{self, Result};
use crate::updater::encode_filename;
use log::debug;
use snafu::ResultExt;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// `Datastore` persists validated metadata files. Writes go to a temporary
/// file in the destination directory followed by a rename, so a reader (or a
/// crash) observes either the prior or the next complete file, never a
/// truncated one.
#[derive(Debug, Clone)]
pub(crate) struct Datastore {
    path: PathBuf,
}

impl Datastore {
    pub(crate) fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).context(error::DatastoreDirSnafu { path })?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// The cache file path for a role, URL-encoding applied to the role name.
    pub(crate) fn file_path(&self, role_name: &str) -> PathBuf {
        self.path.join(format!("{}.json", encode_filename(role_name)))
    }

    /// Reads the cached bytes of a role. A missing file is `Ok(None)`.
    pub(crate) fn read(&self, role_name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.file_path(role_name);
        match std::fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(err) => match err.kind() {
                ErrorKind::NotFound => Ok(None),
                _ => Err(err).context(error::DatastoreReadSnafu { path }),
            },
        }
    }

    /// Atomically replaces the cached bytes of a role. On failure the
    /// temporary file is removed and the previous cached file is untouched.
    pub(crate) fn write(&self, role_name: &str, data: &[u8]) -> Result<()> {
        let path = self.file_path(role_name);
        let mut file = NamedTempFile::new_in(&self.path)
            .context(error::DatastoreTempFileSnafu { path: &self.path })?;
        file.write_all(data)
            .context(error::DatastoreWriteSnafu { path: &path })?;
        file.persist(&path)
            .context(error::DatastorePersistSnafu { path: &path })?;
        debug!("Persisted {} to {}", role_name, path.display());
        Ok(())
    }
}
