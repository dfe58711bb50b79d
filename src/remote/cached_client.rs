//! Cached list client that wraps HttpListClient with transparent caching.

use color_eyre::Result;
use serde_json::Value;

use crate::cache::{FetchError, ListCache, ListQuery, LoadOptions, Snapshot};
use crate::config::Config;
use crate::query::Query;

use super::client::{Endpoint, HttpListClient};

/// List client with transparent caching support.
///
/// Reads go through the cache; every successful mutation invalidates it,
/// since any create/update/delete can change any filtered or paged view.
#[derive(Clone)]
pub struct CachedListClient {
  inner: HttpListClient,
  cache: ListCache<Value>,
}

impl CachedListClient {
  /// Create a new cached list client.
  pub fn new(config: &Config) -> Result<Self> {
    let inner = HttpListClient::new(&config.endpoint)?;
    let cache = ListCache::new(inner.clone()).with_stale_time(config.cache.stale_time());

    Ok(Self { inner, cache })
  }

  pub fn endpoint(&self) -> &Endpoint {
    self.inner.endpoint()
  }

  pub fn cache(&self) -> &ListCache<Value> {
    &self.cache
  }

  /// Load a page and return the entry's state once it settles.
  pub async fn list(&self, query: ListQuery) -> Snapshot<Value> {
    let key = query.key();
    self.cache.load_query(query, LoadOptions::default()).await;
    self.cache.snapshot(&key)
  }

  /// Watch a page; the returned query stays refreshed while it is alive.
  pub fn query(&self, query: ListQuery) -> Query<Value> {
    self.cache.query(query)
  }

  /// Create a record (invalidates on success).
  pub async fn create(&self, record: &Value) -> Result<Value, FetchError> {
    self.cache.mutate(self.inner.create(record)).await
  }

  /// Update a record (invalidates on success).
  pub async fn update(&self, id: &str, record: &Value) -> Result<Value, FetchError> {
    self.cache.mutate(self.inner.update(id, record)).await
  }

  /// Delete a record (invalidates on success).
  pub async fn delete(&self, id: &str) -> Result<(), FetchError> {
    self.cache.mutate(self.inner.delete(id)).await
  }

  /// Import many records (invalidates on success).
  pub async fn bulk_import(&self, records: &[Value]) -> Result<Value, FetchError> {
    self.cache.mutate(self.inner.bulk_import(records)).await
  }
}
