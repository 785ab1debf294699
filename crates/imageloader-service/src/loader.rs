use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use url::Url;

use crate::config::Config;
use crate::coordinator::{RequestCoordinator, RequesterId};
use crate::decode::{Decode, ImageDecoder};
use crate::fetch::{Fetch, HttpFetcher};

/// The capability to load images, as consumed by user interfaces.
///
/// Every on-screen image slot uses its own [`RequesterId`], so that it can cancel its load
/// without affecting other slots showing the same URL.
pub trait LoadImages: Send + Sync {
    type Image: Send + Sync + 'static;

    /// Loads the image behind `url`, resolving to `None` if it could not be loaded, or if the
    /// load was cancelled or superseded.
    fn load_image(&self, url: Url, id: RequesterId) -> BoxFuture<'_, Option<Arc<Self::Image>>>;

    /// Cancels the load of `url` for `id`. Does nothing if no such load is outstanding.
    fn cancel_load(&self, url: &Url, id: RequesterId);
}

/// An image loader with an in-memory cache that coalesces concurrent requests.
///
/// Cloning is cheap and yields a handle to the same loader.
pub struct ImageLoader<D: Decode> {
    coordinator: RequestCoordinator<D>,
}

/// The loader used in production: HTTP fetching and raster image decoding.
pub type StandardImageLoader = ImageLoader<ImageDecoder>;

impl<D: Decode> Clone for ImageLoader<D> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<D: Decode> std::fmt::Debug for ImageLoader<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

impl<D: Decode> ImageLoader<D> {
    /// Creates a loader with a cache holding at most `cache_size` bytes worth of payloads.
    pub fn new(fetcher: Arc<dyn Fetch>, decoder: D, cache_size: u64) -> Self {
        Self {
            coordinator: RequestCoordinator::new(fetcher, decoder, cache_size),
        }
    }

    /// Requests the image behind `url` on behalf of `id`.
    ///
    /// Cached images are returned right away. Otherwise this waits for the (shared) fetch of
    /// `url` to complete. A previous, unresolved request by the same `id` for the same `url`
    /// resolves to `None` when this one is made.
    ///
    /// Dropping the returned future cancels the request, like [`cancel`](Self::cancel).
    pub async fn request(&self, url: Url, id: RequesterId) -> Option<Arc<D::Image>> {
        if let Some(image) = self.coordinator.cached(&url) {
            metric!(counter("loader.cache.hit") += 1);
            return Some(image);
        }
        metric!(counter("loader.cache.miss") += 1);

        match self.coordinator.acquire(url.clone(), id).await {
            Ok(image) => Some(image),
            Err(err) => {
                tracing::trace!(%url, %id, error = &err as &dyn std::error::Error, "No image loaded");
                None
            }
        }
    }

    /// Cancels the request for `url` made on behalf of `id`.
    ///
    /// The request resolves to `None` immediately. The fetch itself is only cancelled when no
    /// other requester waits for `url`.
    pub fn cancel(&self, url: &Url, id: RequesterId) {
        self.coordinator.release(url, id);
    }

    /// Returns the cached image for `url`, if any.
    pub fn cached(&self, url: &Url) -> Option<Arc<D::Image>> {
        self.coordinator.cached(url)
    }

    /// The cache budget in bytes of downloaded payload.
    pub fn cache_size(&self) -> u64 {
        self.coordinator.cache_size()
    }

    /// Changes the cache budget, evicting images if the cache is over the new budget.
    pub fn set_cache_size(&self, cache_size: u64) {
        self.coordinator.set_cache_size(cache_size);
    }

    /// Gives access to the underlying coordinator.
    pub fn coordinator(&self) -> &RequestCoordinator<D> {
        &self.coordinator
    }
}

impl StandardImageLoader {
    /// Creates a loader that fetches over HTTP, as configured.
    pub fn from_config(config: &Config) -> reqwest::Result<Self> {
        let fetcher = HttpFetcher::from_config(config)?;
        Ok(Self::new(
            Arc::new(fetcher),
            ImageDecoder::from_config(config),
            config.cache_size,
        ))
    }
}

impl<D: Decode> LoadImages for ImageLoader<D> {
    type Image = D::Image;

    fn load_image(&self, url: Url, id: RequesterId) -> BoxFuture<'_, Option<Arc<D::Image>>> {
        self.request(url, id).boxed()
    }

    fn cancel_load(&self, url: &Url, id: RequesterId) {
        self.cancel(url, id)
    }
}
