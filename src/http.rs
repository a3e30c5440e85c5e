//! The `http` module provides [`HttpFetcher`], a [`Fetcher`] over HTTP(S)
//! with retry logic.

use crate::fetcher::{FetchError, Fetcher, HttpStatusSnafu, LengthMismatchSnafu};
use log::{debug, trace};
use reqwest::blocking::{Client, ClientBuilder};
use reqwest::redirect;
use snafu::ensure;
use std::io::Read;
use std::time::Duration;
use url::Url;

/// A builder for [`HttpFetcher`] which allows settings customization.
///
/// # Example
///
/// ```no_run
/// # use staunch::HttpFetcherBuilder;
/// let fetcher = HttpFetcherBuilder::new()
///     .tries(3)
///     .backoff_factor(1.5)
///     .build();
/// ```
#[derive(Clone, Copy, Debug)]
pub struct HttpFetcherBuilder {
    timeout: Duration,
    connect_timeout: Duration,
    tries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    backoff_factor: f32,
}

impl Default for HttpFetcherBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            // try / 100ms / try / 150ms / try / 225ms / try
            tries: 4,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            backoff_factor: 1.5,
        }
    }
}

impl HttpFetcherBuilder {
    /// Create a new `HttpFetcherBuilder` with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a timeout for the complete fetch operation.
    #[must_use]
    pub fn timeout(mut self, value: Duration) -> Self {
        self.timeout = value;
        self
    }

    /// Set a timeout for only the connect phase.
    #[must_use]
    pub fn connect_timeout(mut self, value: Duration) -> Self {
        self.connect_timeout = value;
        self
    }

    /// Set the total number of times we will try the fetch operation (in case
    /// of retryable failures).
    #[must_use]
    pub fn tries(mut self, value: u32) -> Self {
        self.tries = value.max(1);
        self
    }

    /// Set the pause duration between the first and second try.
    #[must_use]
    pub fn initial_backoff(mut self, value: Duration) -> Self {
        self.initial_backoff = value;
        self
    }

    /// Set the maximum duration of a pause between retries.
    #[must_use]
    pub fn max_backoff(mut self, value: Duration) -> Self {
        self.max_backoff = value;
        self
    }

    /// Set the exponential backoff factor, the factor by which the pause time
    /// will increase after each try until reaching `max_backoff`.
    #[must_use]
    pub fn backoff_factor(mut self, value: f32) -> Self {
        self.backoff_factor = value;
        self
    }

    /// Construct an [`HttpFetcher`] from this builder's settings.
    pub fn build(self) -> HttpFetcher {
        HttpFetcher { settings: self }
    }
}

/// A [`Fetcher`] over HTTP(S) with retry logic. Use [`HttpFetcherBuilder`] to
/// customize settings, or `HttpFetcher::default()`.
///
/// Transport failures and 5xx responses are retried with exponential backoff;
/// other failures are returned immediately. Redirects that downgrade https to
/// http are never followed.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    settings: HttpFetcherBuilder,
}

impl HttpFetcher {
    fn client(&self, url: &Url) -> Result<Client, FetchError> {
        ClientBuilder::new()
            .timeout(self.settings.timeout)
            .connect_timeout(self.settings.connect_timeout)
            .redirect(redirect::Policy::custom(|attempt| {
                let downgrade = attempt.url().scheme() == "http"
                    && attempt.previous().iter().any(|url| url.scheme() == "https");
                if downgrade {
                    attempt.error("refusing to follow a redirect from https to http")
                } else {
                    attempt.follow()
                }
            }))
            .build()
            .map_err(|e| FetchError::transport(url, e))
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &Url, max_length: u64) -> Result<Vec<u8>, FetchError> {
        let client = self.client(url)?;
        let mut tries = self.settings.tries.max(1);
        let mut backoff = self.settings.initial_backoff;
        loop {
            tries -= 1;
            match fetch_once(&client, url, max_length) {
                Ok(data) => return Ok(data),
                Err(err) if tries == 0 || !retryable(&err) => return Err(err),
                Err(err) => {
                    debug!("Retrying {} after error: {}", url, err);
                    std::thread::sleep(backoff);
                    backoff = backoff
                        .mul_f32(self.settings.backoff_factor)
                        .min(self.settings.max_backoff);
                }
            }
        }
    }
}

fn retryable(err: &FetchError) -> bool {
    match err {
        FetchError::Download { .. } => true,
        FetchError::HttpStatus { status, .. } => *status >= 500,
        _ => false,
    }
}

fn fetch_once(client: &Client, url: &Url, max_length: u64) -> Result<Vec<u8>, FetchError> {
    trace!("GET {}", url);
    let response = client
        .get(url.clone())
        .send()
        .map_err(|e| FetchError::transport(url, e))?;

    let status = response.status();
    ensure!(
        status.is_success(),
        HttpStatusSnafu { status: status.as_u16(), url: url.as_str() }
    );

    // Reject early when the server announces an overlong body.
    if let Some(length) = response.content_length() {
        ensure!(
            length <= max_length,
            LengthMismatchSnafu { url: url.as_str(), max_length }
        );
    }

    let mut data = Vec::new();
    response
        .take(max_length.saturating_add(1))
        .read_to_end(&mut data)
        .map_err(|e| FetchError::transport(url, e))?;
    ensure!(
        data.len() as u64 <= max_length,
        LengthMismatchSnafu { url: url.as_str(), max_length }
    );
    Ok(data)
}
