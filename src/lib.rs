#![warn(rust_2018_idioms)]
// missing_docs is on for this library so that the public API stays documented.
#![warn(missing_docs)]

//! `staunch` is a client-side implementation of [The Update Framework
//! (TUF)](https://theupdateframework.github.io/): a secure software-update
//! protocol that uses role-separated, threshold-signed metadata to distribute
//! target files with strong compromise-resilience.
//!
//! A client holds a trusted local root of trust, refreshes the chain of
//! metadata roles from an untrusted remote repository, and uses the verified
//! metadata to decide which target artifacts to download and to confirm
//! their integrity.
//!
//! The two central types:
//!
//! * [`TrustedMetadataSet`] — the state machine that accepts candidate
//!   metadata and mutates the trusted snapshot of the four top-level roles
//!   plus delegated targets, enforcing every signature, version, expiration,
//!   and cross-role consistency rule.
//! * [`Updater`] — the workflow that fetches metadata in the prescribed
//!   order, persists validated copies atomically to a local cache, and walks
//!   the targets delegation graph to resolve a requested target.
//!
//! # Example
//!
//! ```no_run
//! # fn main() -> staunch::Result<()> {
//! use staunch::{HttpFetcher, Updater, UpdaterConfig};
//! use url::Url;
//!
//! // The metadata directory must already hold a trusted root.json.
//! let mut updater = Updater::new(
//!     "/var/lib/example/metadata",
//!     Url::parse("https://example.org/metadata/").unwrap(),
//!     Some("/var/lib/example/targets".into()),
//!     Some(Url::parse("https://example.org/targets/").unwrap()),
//!     Box::new(HttpFetcher::default()),
//!     UpdaterConfig::default(),
//! )?;
//!
//! updater.refresh()?;
//! let info = updater.get_target_info("app/config.json")?;
//! let path = match updater.find_cached_target(&info, None) {
//!     Ok(path) => path,
//!     Err(_) => updater.download_target(&info, None, None)?,
//! };
//! println!("verified target at {}", path.display());
//! # Ok(())
//! # }
//! ```

mod config;
mod datastore;
mod error;
mod fetcher;
#[cfg(feature = "http")]
mod http;
pub mod schema;
mod sign;
mod trusted;
mod updater;

pub use crate::config::UpdaterConfig;
pub use crate::error::{Error, Result};
pub use crate::fetcher::{FetchError, Fetcher, FilesystemFetcher};
#[cfg(feature = "http")]
pub use crate::http::{HttpFetcher, HttpFetcherBuilder};
pub use crate::sign::{parse_keypair, Sign};
pub use crate::trusted::TrustedMetadataSet;
pub use crate::updater::Updater;
