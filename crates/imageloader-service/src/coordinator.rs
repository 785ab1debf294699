//! Coalescing of concurrent image requests.
//!
//! The [`RequestCoordinator`] guarantees that at most one fetch is in flight per URL, no matter
//! how many requesters are waiting for it. Every requester registers a [`Waiter`] under its
//! [`RequesterId`], and when the fetch completes its outcome is fanned out to every waiter that
//! is still registered.
//!
//! All bookkeeping (the image cache and the table of pending fetches) lives behind a single
//! mutex. Critical sections are short and never await; the fetch and decode themselves run
//! on a spawned task outside of the lock.
//!
//! Cancellation is per requester: releasing a requester only resolves its own waiter. The
//! underlying fetch is aborted once the last waiter for its URL is gone.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use imageloader_cache::CostCache;
use thiserror::Error;
use tokio::task::JoinHandle;
use url::Url;
use uuid::Uuid;

use crate::decode::{Decode, DecodeError};
use crate::fetch::{Fetch, FetchError};
use crate::utils::defer::CallOnDrop;
use crate::waiter::Waiter;

pub use crate::waiter::{Outcome, PendingLoad};

/// Identifies one logical requester, scoping cancellation to it.
///
/// Several requesters may wait on the same URL, each under its own id.
pub type RequesterId = Uuid;

/// The reason a load did not produce an image.
///
/// This is only used for bookkeeping and logging: the
/// [`ImageLoader`](crate::loader::ImageLoader) collapses all of these into `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The payload could not be fetched.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    /// The payload was fetched, but could not be decoded.
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    /// A newer request for the same URL and requester replaced this one.
    #[error("superseded by a newer request")]
    Superseded,
    /// The requester cancelled the load.
    #[error("cancelled")]
    Cancelled,
    /// The fetch task stopped before producing a result.
    #[error("fetch task interrupted")]
    Interrupted,
}

impl LoadError {
    fn metrics_tag(&self) -> &'static str {
        match self {
            LoadError::Fetch(FetchError::NotFound) => "notfound",
            LoadError::Fetch(FetchError::PermissionDenied(_)) => "permissiondenied",
            LoadError::Fetch(FetchError::Timeout(_)) => "timeout",
            LoadError::Fetch(FetchError::DownloadError(_)) => "downloaderror",
            LoadError::Decode(_) => "malformed",
            LoadError::Superseded => "superseded",
            LoadError::Cancelled => "cancelled",
            LoadError::Interrupted => "interrupted",
        }
    }
}

/// Bookkeeping for one in-flight fetch and the requesters waiting on it.
struct PendingFetch<T> {
    /// Unique per fetch, so a stale fetch task can never resolve waiters of a newer fetch
    /// for the same URL.
    fetch_id: u64,
    waiters: HashMap<RequesterId, Waiter<T>>,
    task: Option<JoinHandle<()>>,
}

struct State<T> {
    cache: CostCache<Url, Arc<T>>,
    pending: HashMap<Url, PendingFetch<T>>,
}

struct Inner<D: Decode> {
    state: Mutex<State<D::Image>>,
    fetcher: Arc<dyn Fetch>,
    decoder: Arc<D>,
    next_id: AtomicU64,
}

/// Tracks in-flight fetches per URL and the requesters waiting on them.
///
/// Cloning is cheap and yields a handle to the same coordinator.
pub struct RequestCoordinator<D: Decode> {
    inner: Arc<Inner<D>>,
}

impl<D: Decode> Clone for RequestCoordinator<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Decode> std::fmt::Debug for RequestCoordinator<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.try_lock();
        let (cached, pending) = state
            .map(|state| (state.cache.len(), state.pending.len()))
            .unwrap_or_default();
        f.debug_struct("RequestCoordinator")
            .field("cached images", &cached)
            .field("pending fetches", &pending)
            .finish()
    }
}

impl<D: Decode> RequestCoordinator<D> {
    /// Creates a coordinator with an image cache bounded to `cache_size` bytes of payload.
    pub fn new(fetcher: Arc<dyn Fetch>, decoder: D, cache_size: u64) -> Self {
        let state = State {
            cache: CostCache::new(cache_size),
            pending: HashMap::new(),
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                fetcher,
                decoder: Arc::new(decoder),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Looks up a cached image without registering any interest.
    pub fn cached(&self, key: &Url) -> Option<Arc<D::Image>> {
        self.inner.lock().cache.get(key).cloned()
    }

    /// Registers `requester` as waiting for the image behind `key`.
    ///
    /// Starts a fetch if none is in flight for `key`. If `requester` already waits on `key`,
    /// its previous waiter is resolved with [`LoadError::Superseded`] before the new one is
    /// registered.
    ///
    /// The returned future resolves once the fetch completes or the requester is released.
    /// Dropping it early releases the requester, just like [`release`](Self::release), unless
    /// it has been superseded in the meantime.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime, as the fetch is spawned onto it.
    pub fn acquire(&self, key: Url, requester: RequesterId) -> PendingLoad<D::Image> {
        let ticket = self.inner.next_id();
        let (waiter, pending) = Waiter::new(ticket);

        let pending = pending.on_drop({
            let inner = Arc::downgrade(&self.inner);
            let key = key.clone();
            CallOnDrop::new(move || release_ticket(inner, &key, requester, ticket))
        });

        let mut state = self.inner.lock();

        // The fetch may have completed since the caller checked the cache.
        if let Some(image) = state.cache.get(&key) {
            metric!(counter("loader.cache.late_hit") += 1);
            waiter.resolve(Ok(Arc::clone(image)));
            return pending;
        }

        let fetch = match state.pending.entry(key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let fetch_id = self.inner.next_id();
                tracing::debug!(%key, fetch_id, "Starting fetch");
                metric!(counter("loader.fetch.started") += 1);

                let task = Inner::spawn_fetch(&self.inner, key.clone(), fetch_id);
                entry.insert(PendingFetch {
                    fetch_id,
                    waiters: HashMap::new(),
                    task: Some(task),
                })
            }
        };

        if let Some(previous) = fetch.waiters.remove(&requester) {
            tracing::trace!(%key, %requester, "Superseding previous request");
            metric!(counter("loader.waiter.superseded") += 1);
            previous.resolve(Err(LoadError::Superseded));
        }
        tracing::trace!(%key, %requester, ticket, "Registering waiter");
        fetch.waiters.insert(requester, waiter);

        pending
    }

    /// Withdraws `requester`'s interest in `key`.
    ///
    /// Resolves the requester's waiter with [`LoadError::Cancelled`]. If no other requester
    /// waits on `key` anymore, the in-flight fetch is aborted. Releasing a requester that does
    /// not wait on `key` is a no-op.
    pub fn release(&self, key: &Url, requester: RequesterId) {
        self.inner.release(key, requester, None);
    }

    /// The number of URLs with a fetch in flight.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// The number of requesters currently waiting on `key`.
    pub fn waiter_count(&self, key: &Url) -> usize {
        self.inner
            .lock()
            .pending
            .get(key)
            .map_or(0, |fetch| fetch.waiters.len())
    }

    /// The total cost budget of the image cache, in bytes.
    pub fn cache_size(&self) -> u64 {
        self.inner.lock().cache.limit()
    }

    /// Changes the cost budget of the image cache, evicting images if necessary.
    pub fn set_cache_size(&self, cache_size: u64) {
        self.inner.lock().cache.set_limit(cache_size);
    }
}

/// Releases a requester only if its current registration still carries `ticket`.
fn release_ticket<D: Decode>(inner: Weak<Inner<D>>, key: &Url, requester: RequesterId, ticket: u64) {
    if let Some(inner) = inner.upgrade() {
        inner.release(key, requester, Some(ticket));
    }
}

impl<D: Decode> Inner<D> {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, State<D::Image>> {
        // The state is consistent after every critical section, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self, key: &Url, requester: RequesterId, ticket: Option<u64>) {
        let task = {
            let mut state = self.lock();
            let Entry::Occupied(mut entry) = state.pending.entry(key.clone()) else {
                return;
            };

            let fetch = entry.get_mut();
            let is_current = match (fetch.waiters.get(&requester), ticket) {
                (None, _) => false,
                (Some(waiter), Some(ticket)) => waiter.ticket() == ticket,
                (Some(_), None) => true,
            };
            if !is_current {
                return;
            }

            if let Some(waiter) = fetch.waiters.remove(&requester) {
                tracing::trace!(%key, %requester, "Releasing waiter");
                metric!(counter("loader.waiter.released") += 1);
                waiter.resolve(Err(LoadError::Cancelled));
            }

            if !entry.get().waiters.is_empty() {
                return;
            }

            let mut fetch = entry.remove();
            tracing::debug!(%key, fetch_id = fetch.fetch_id, "Cancelling fetch without waiters");
            metric!(counter("loader.fetch.cancelled") += 1);
            fetch.task.take()
        };

        // Aborting may drop the task right here, so it must happen outside of the lock.
        if let Some(task) = task {
            task.abort();
        }
    }

    fn spawn_fetch(this: &Arc<Self>, key: Url, fetch_id: u64) -> JoinHandle<()> {
        let inner = Arc::clone(this);

        tokio::spawn(async move {
            // Resolves the waiters if the task panics. When the task is aborted, the fetch
            // was already removed and completing it only finds a mismatching `fetch_id`.
            let interrupted = {
                let inner = Arc::clone(&inner);
                let key = key.clone();
                CallOnDrop::new(move || inner.complete(&key, fetch_id, Err(LoadError::Interrupted)))
            };

            let result = inner.fetch_and_decode(&key).await;
            interrupted.disarm();
            inner.complete(&key, fetch_id, result);
        })
    }

    async fn fetch_and_decode(&self, key: &Url) -> Result<(Arc<D::Image>, u64), LoadError> {
        let data = self.fetcher.fetch(key).await?;
        let cost = data.len() as u64;
        metric!(time_raw("loader.fetch.size") = cost);

        let decoder = Arc::clone(&self.decoder);
        let image = tokio::task::spawn_blocking(move || decoder.decode(&data))
            .await
            .map_err(|_| LoadError::Interrupted)??;

        Ok((Arc::new(image), cost))
    }

    /// Caches a successful result and fans the outcome out to all current waiters of `key`.
    fn complete(&self, key: &Url, fetch_id: u64, result: Result<(Arc<D::Image>, u64), LoadError>) {
        let mut state = self.lock();

        let outcome = match result {
            Ok((image, cost)) => {
                if !state.cache.put(key.clone(), Arc::clone(&image), cost) {
                    tracing::debug!(%key, cost, "Image exceeds the cache size, not caching it");
                }
                Ok(image)
            }
            Err(err) => {
                tracing::debug!(%key, error = &err as &dyn std::error::Error, "Failed to load image");
                Err(err)
            }
        };
        metric!(
            counter("loader.fetch.done") += 1,
            "status" => outcome.as_ref().map_or_else(|err| err.metrics_tag(), |_| "ok"),
        );

        let Entry::Occupied(entry) = state.pending.entry(key.clone()) else {
            tracing::trace!(%key, fetch_id, "Fetch completed without waiters");
            return;
        };
        if entry.get().fetch_id != fetch_id {
            tracing::trace!(%key, fetch_id, "Stale fetch completed");
            return;
        }

        let fetch = entry.remove();
        tracing::debug!(%key, fetch_id, waiters = fetch.waiters.len(), "Fetch completed");
        for (_, waiter) in fetch.waiters {
            waiter.resolve(outcome.clone());
        }
    }
}
