//! Concurrent image loading with request coalescing and a cost-bounded cache.
//!
//! The entry point is the [`ImageLoader`](loader::ImageLoader), which serves any number of
//! concurrent requesters for the same URL from a single download. See the [`coordinator`]
//! module for the bookkeeping behind it.

#[macro_use]
pub mod metrics;

pub mod config;
pub mod coordinator;
pub mod decode;
pub mod fetch;
pub mod loader;
pub mod logging;
pub mod recipes;
pub mod utils;
mod waiter;


pub use coordinator::{LoadError, PendingLoad, RequesterId};
pub use loader::{ImageLoader, LoadImages, StandardImageLoader};
