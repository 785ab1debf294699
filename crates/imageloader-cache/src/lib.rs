//! Caching primitives for the image loader.
//!
//! Currently there is a [`CostCache`] which bounds the sum of the "cost" of its entries
//! instead of the number of entries.

#![warn(missing_docs)]

mod cost;

pub use cost::*;

/// The default cost limit of a [`CostCache`], in bytes: 20 MiB.
pub const DEFAULT_COST_LIMIT: u64 = 20 * 1024 * 1024;
