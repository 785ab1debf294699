use std::time::Duration;

use reqwest::redirect;

use crate::config::Config;

/// The `User-Agent` sent with every request.
pub const USER_AGENT: &str = concat!("imageloader/", env!("CARGO_PKG_VERSION"));

/// Timeouts applied to every download.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FetchTimeouts {
    /// The timeout for establishing a connection.
    pub connect: Duration,
    /// Global timeout for one download, from sending the request until the last byte
    /// of the body was received.
    pub max_download: Duration,
}

impl FetchTimeouts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect: config.connect_timeout,
            max_download: config.max_download_timeout,
        }
    }
}

impl Default for FetchTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            max_download: Duration::from_secs(5),
        }
    }
}

/// Creates a [`reqwest::Client`] with the provided timeouts.
pub fn create_client(timeouts: &FetchTimeouts) -> reqwest::Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        .gzip(true)
        .user_agent(USER_AGENT)
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.max_download)
        .pool_idle_timeout(Duration::from_secs(30))
        .redirect(redirect::Policy::limited(10))
        .build()
}
