//! Support to fetch images from HTTP servers.

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use url::Url;

use crate::config::Config;
use crate::utils::http::{FetchTimeouts, create_client};

use super::{Fetch, FetchError};

/// Fetcher implementation that downloads payloads over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeouts: FetchTimeouts,
}

impl HttpFetcher {
    pub fn new(client: Client, timeouts: FetchTimeouts) -> Self {
        Self { client, timeouts }
    }

    pub fn from_config(config: &Config) -> reqwest::Result<Self> {
        let timeouts = FetchTimeouts::from_config(config);
        let client = create_client(&timeouts)?;
        Ok(Self::new(client, timeouts))
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &Url) -> BoxFuture<'static, Result<Bytes, FetchError>> {
        download(self.client.clone(), url.clone(), self.timeouts).boxed()
    }
}

async fn download(client: Client, url: Url, timeouts: FetchTimeouts) -> Result<Bytes, FetchError> {
    tracing::debug!("Fetching image from `{}`", url);

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|err| request_error(err, &timeouts))?;

    let status = response.status();
    if !status.is_success() {
        return Err(status_error(&url, status));
    }

    tracing::trace!("Success hitting `{url}`");
    response
        .bytes()
        .await
        .map_err(|err| request_error(err, &timeouts))
}

fn request_error(error: reqwest::Error, timeouts: &FetchTimeouts) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(timeouts.max_download)
    } else {
        error.into()
    }
}

/// Uses the HTTP status code to infer the [`FetchError`].
fn status_error(url: &Url, status: StatusCode) -> FetchError {
    match status {
        StatusCode::NOT_FOUND => {
            tracing::debug!("Image not found at `{url}`");
            FetchError::NotFound
        }
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
            tracing::debug!("Insufficient permissions to download `{url}`: {status}");
            FetchError::PermissionDenied(status.to_string())
        }
        _ => {
            tracing::debug!("Unexpected status code from `{url}`: {status}");
            FetchError::DownloadError(status.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error() {
        let url = "http://example.com/a.png".parse().unwrap();

        assert_eq!(status_error(&url, StatusCode::NOT_FOUND), FetchError::NotFound);
        assert_eq!(
            status_error(&url, StatusCode::UNAUTHORIZED),
            FetchError::PermissionDenied("401 Unauthorized".into())
        );
        assert_eq!(
            status_error(&url, StatusCode::GONE),
            FetchError::DownloadError("410 Gone".into())
        );
        assert_eq!(
            status_error(&url, StatusCode::TOO_MANY_REQUESTS),
            FetchError::DownloadError("429 Too Many Requests".into())
        );
        assert_eq!(
            status_error(&url, StatusCode::BAD_GATEWAY),
            FetchError::DownloadError("502 Bad Gateway".into())
        );
    }
}
