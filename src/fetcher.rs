//! A trait to abstract over the method/protocol by which repository files are
//! obtained, and a `file://` implementation.

use dyn_clone::DynClone;
use snafu::{ensure, Snafu};
use std::fmt::Debug;
use std::io::Read;
use std::path::PathBuf;
use url::Url;

/// A transport that retrieves a bounded byte stream given a URL.
///
/// Implementations may stream, but must reject bodies longer than
/// `max_length` before buffering beyond that limit.
pub trait Fetcher: Debug + DynClone {
    /// Fetches the file at `url`, returning the full body. Fails with
    /// [`FetchError::LengthMismatch`] if the body exceeds `max_length` bytes.
    fn fetch(&self, url: &Url, max_length: u64) -> Result<Vec<u8>, FetchError>;
}

// Implement `Clone` for `Fetcher` trait objects.
dyn_clone::clone_trait_object!(Fetcher);

/// The error type that [`Fetcher`] implementations return.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
#[non_exhaustive]
pub enum FetchError {
    /// The server announced, or the stream yielded, more bytes than the
    /// caller's limit.
    #[snafu(display("{url} exceeded the download limit of {max_length} bytes"))]
    LengthMismatch {
        /// The URL being fetched.
        url: String,
        /// The limit that was exceeded.
        max_length: u64,
    },

    /// The server responded with a non-success status code.
    #[snafu(display("Failed to download {url}: status {status}"))]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// The URL being fetched.
        url: String,
    },

    /// The transport failed for any other reason, e.g. IO error, broken pipe,
    /// file not found.
    #[snafu(display("Failed to download {url}: {source}"))]
    Download {
        /// The URL being fetched.
        url: String,
        /// The underlying error that occurred.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl FetchError {
    /// Creates a [`FetchError::Download`] from any error type.
    pub fn transport<E>(url: &Url, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Download {
            url: url.to_string(),
            source: source.into(),
        }
    }
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// A [`Fetcher`] for local repositories addressed by `file://` URLs.
#[derive(Debug, Clone, Copy)]
pub struct FilesystemFetcher;

impl Fetcher for FilesystemFetcher {
    fn fetch(&self, url: &Url, max_length: u64) -> Result<Vec<u8>, FetchError> {
        if url.scheme() != "file" {
            return Err(FetchError::transport(
                url,
                format!("cannot handle scheme {}", url.scheme()),
            ));
        }

        let path = PathBuf::from(url.path());
        let file = std::fs::File::open(&path).map_err(|e| FetchError::transport(url, e))?;

        let mut data = Vec::new();
        file.take(max_length.saturating_add(1))
            .read_to_end(&mut data)
            .map_err(|e| FetchError::transport(url, e))?;
        ensure!(
            data.len() as u64 <= max_length,
            LengthMismatchSnafu { url: url.as_str(), max_length }
        );
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::{Fetcher, FilesystemFetcher};
    use url::Url;

    #[test]
    fn fetch_within_limit() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, b"hello").unwrap();
        let url = Url::from_file_path(&path).unwrap();

        assert_eq!(FilesystemFetcher.fetch(&url, 5).unwrap(), b"hello");
    }

    #[test]
    fn overlong_body_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, b"hello").unwrap();
        let url = Url::from_file_path(&path).unwrap();

        assert!(FilesystemFetcher.fetch(&url, 4).is_err());
    }

    #[test]
    fn missing_file_fails() {
        let url = Url::parse("file:///definitely/not/here.json").unwrap();
        assert!(FilesystemFetcher.fetch(&url, 1024).is_err());
    }
}
