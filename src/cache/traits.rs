//! Core traits and types for the caching system.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

use super::key::ListQuery;

/// One page of results from a list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage<T> {
  /// Records in result order
  #[serde(alias = "data")]
  pub records: Vec<T>,
  /// Number of records matching the filters across all pages
  pub total_count: u64,
  pub page: u32,
  pub limit: u32,
  pub total_pages: u32,
}

impl<T> ListPage<T> {
  /// Build a page, computing `total_pages` from the total count and limit.
  pub fn new(records: Vec<T>, total_count: u64, page: u32, limit: u32) -> Self {
    Self {
      records,
      total_count,
      page,
      limit,
      total_pages: total_pages(total_count, limit),
    }
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}

/// Number of pages of `limit` records needed to hold `total_count` records.
pub fn total_pages(total_count: u64, limit: u32) -> u32 {
  if limit == 0 {
    return 0;
  }
  u32::try_from(total_count.div_ceil(u64::from(limit))).unwrap_or(u32::MAX)
}

/// Failure of a list fetch or a mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FetchError {
  /// HTTP status code, when the failure came from a response
  pub status: Option<u16>,
  pub message: String,
}

impl FetchError {
  /// Status returned for accounts whose plan has not been set up yet.
  pub const PLAN_NOT_CONFIGURED: u16 = 403;

  pub fn new(message: impl Into<String>) -> Self {
    Self {
      status: None,
      message: message.into(),
    }
  }

  pub fn with_status(status: u16, message: impl Into<String>) -> Self {
    Self {
      status: Some(status),
      message: message.into(),
    }
  }

  /// Expected for new accounts; recorded on the entry but not logged.
  pub fn is_plan_not_configured(&self) -> bool {
    self.status == Some(Self::PLAN_NOT_CONFIGURED)
  }
}

/// The remote list operation the cache fetches through.
pub trait ListSource<T>: Send + Sync {
  fn list(&self, query: &ListQuery) -> BoxFuture<'static, Result<ListPage<T>, FetchError>>;
}

/// A [`ListSource`] backed by a closure.
pub struct FnSource<F>(F);

/// Wrap a closure returning a future as a [`ListSource`].
pub fn source_fn<T, F, Fut>(f: F) -> FnSource<F>
where
  F: Fn(ListQuery) -> Fut + Send + Sync,
  Fut: Future<Output = Result<ListPage<T>, FetchError>> + Send + 'static,
{
  FnSource(f)
}

impl<T, F, Fut> ListSource<T> for FnSource<F>
where
  F: Fn(ListQuery) -> Fut + Send + Sync,
  Fut: Future<Output = Result<ListPage<T>, FetchError>> + Send + 'static,
{
  fn list(&self, query: &ListQuery) -> BoxFuture<'static, Result<ListPage<T>, FetchError>> {
    Box::pin((self.0)(query.clone()))
  }
}

/// What an observer sees for one cache entry.
#[derive(Debug)]
pub struct Snapshot<T> {
  pub data: Option<Arc<ListPage<T>>>,
  pub loading: bool,
  pub error: Option<FetchError>,
}

impl<T> Clone for Snapshot<T> {
  fn clone(&self) -> Self {
    Self {
      data: self.data.clone(),
      loading: self.loading,
      error: self.error.clone(),
    }
  }
}

impl<T> Default for Snapshot<T> {
  fn default() -> Self {
    Self {
      data: None,
      loading: false,
      error: None,
    }
  }
}

/// Receives a snapshot every time the entry it is subscribed to changes.
///
/// Called with no cache locks held, so implementations may call back into the
/// cache. Snapshots arrive one at a time and in the order the entry changed;
/// a state that was already superseded by the time it is delivered is skipped.
pub trait Observer<T>: Send + Sync {
  fn on_change(&self, snapshot: &Snapshot<T>);
}

impl<T, F> Observer<T> for F
where
  F: Fn(&Snapshot<T>) + Send + Sync,
{
  fn on_change(&self, snapshot: &Snapshot<T>) {
    self(snapshot)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_total_pages_rounds_up() {
    assert_eq!(total_pages(0, 10), 0);
    assert_eq!(total_pages(10, 10), 1);
    assert_eq!(total_pages(11, 10), 2);
    assert_eq!(total_pages(30, 7), 5);
  }

  #[test]
  fn test_page_deserializes_data_alias() {
    let page: ListPage<u32> = serde_json::from_str(
      r#"{"data":[1,2],"totalCount":2,"page":1,"limit":10,"totalPages":1}"#,
    )
    .unwrap();
    assert_eq!(page.records, vec![1, 2]);
    assert_eq!(page.total_count, 2);
  }

  #[test]
  fn test_plan_not_configured() {
    assert!(FetchError::with_status(403, "plan").is_plan_not_configured());
    assert!(!FetchError::with_status(500, "boom").is_plan_not_configured());
    assert!(!FetchError::new("offline").is_plan_not_configured());
  }
}
