//! Fetching raw image payloads.
//!
//! The loader does not care where bytes come from: anything implementing [`Fetch`] can
//! be plugged in. [`HttpFetcher`] is the implementation used in production.

use std::error::Error;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use thiserror::Error;
use url::Url;

mod http;

pub use self::http::HttpFetcher;

/// An error that happens when fetching a payload from a remote location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The payload was not found at the remote location.
    #[error("not found")]
    NotFound,
    /// The payload could not be fetched due to missing permissions.
    ///
    /// The attached string contains the remote's response status.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The payload could not be fetched in time.
    #[error("download timed out after {0:?}")]
    Timeout(Duration),
    /// The payload could not be fetched due to another problem, like connection loss,
    /// DNS resolution, or an unexpected response status.
    #[error("download failed: {0}")]
    DownloadError(String),
}

impl FetchError {
    /// Creates a [`FetchError::DownloadError`] from the innermost cause of `error`.
    pub fn download_error(mut error: &dyn Error) -> Self {
        while let Some(src) = error.source() {
            error = src;
        }

        let mut error_string = error.to_string();

        // Special-case a few error strings
        if error_string.contains("certificate verify failed") {
            error_string = "certificate verify failed".to_string();
        }

        if error_string.contains("SSL routines") {
            error_string = "SSL error".to_string();
        }

        Self::DownloadError(error_string)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        Self::download_error(&error)
    }
}

/// Asynchronously fetches the raw payload behind a URL.
///
/// The returned future must not borrow from `self`, as it is driven on a spawned task.
/// Timeouts are up to the implementation.
pub trait Fetch: Send + Sync + 'static {
    fn fetch(&self, url: &Url) -> BoxFuture<'static, Result<Bytes, FetchError>>;
}
