//! Range-aware caching layer for paginated list endpoints.
//!
//! This module provides an endpoint-agnostic cache that:
//! - Identifies each query by a canonical key (filter order and nulls don't matter)
//! - Answers narrower pages from a cached wider page with the same filters
//! - Shares one in-flight fetch between everyone asking for the same key
//! - Treats data older than the stale time (2 minutes by default) as needing a refresh
//! - Notifies observers on every entry change and refreshes watched entries on invalidation

mod clock;
mod key;
mod layer;
mod range;
mod store;
mod subscription;
mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::{encode, CacheKey, ListQuery};
pub use layer::{CacheStats, ListCache, LoadOptions, DEFAULT_STALE_SECONDS};
pub use range::{can_cover, derive_slice, filters_equal};
pub use store::LoadHandle;
pub use subscription::Subscription;
pub use traits::{
  source_fn, total_pages, FetchError, FnSource, ListPage, ListSource, Observer, Snapshot,
};
