//! Client-side cache for paginated, filterable list endpoints.
//!
//! Pages are stored under a canonical key built from their filters and
//! paging. A page contained in a wider cached page with the same filters is
//! sliced out of it instead of fetched, concurrent loads of one key share a
//! single request, and entries refetch after a stale window (two minutes by
//! default). Observers subscribe per key; [`cache::ListCache::invalidate_all`]
//! marks everything stale and refetches what is being watched.

pub mod cache;
pub mod config;
pub mod logging;
pub mod query;
pub mod remote;

pub use cache::{FetchError, ListCache, ListPage, ListQuery, ListSource, Snapshot};
pub use query::Query;
