//! Query parameters and their canonical cache keys.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// A paginated, filtered request against a list endpoint.
///
/// Filter fields are kept sorted by name, and a `null` value is the same as
/// an absent field, so two queries built in a different order (or with
/// explicit nulls) compare and encode identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
  filters: BTreeMap<String, Value>,
  page: u32,
  limit: u32,
}

impl ListQuery {
  /// Create an unfiltered query. `page` and `limit` are clamped to at least 1.
  pub fn new(page: u32, limit: u32) -> Self {
    Self {
      filters: BTreeMap::new(),
      page: page.max(1),
      limit: limit.max(1),
    }
  }

  /// Builder form of [`ListQuery::set_filter`].
  pub fn filter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
    self.set_filter(name, value);
    self
  }

  /// Set a filter field. Setting `null` removes the field.
  pub fn set_filter(&mut self, name: impl Into<String>, value: impl Into<Value>) {
    let name = name.into();
    match value.into() {
      Value::Null => {
        self.filters.remove(&name);
      }
      value => {
        self.filters.insert(name, value);
      }
    }
  }

  pub fn filters(&self) -> &BTreeMap<String, Value> {
    &self.filters
  }

  /// Value of a filter field, `null` when absent.
  pub fn filter_value(&self, name: &str) -> &Value {
    self.filters.get(name).unwrap_or(&Value::Null)
  }

  pub fn page(&self) -> u32 {
    self.page
  }

  pub fn limit(&self) -> u32 {
    self.limit
  }

  /// Index of the first record this query asks for.
  pub fn offset(&self) -> u64 {
    u64::from(self.page - 1) * u64::from(self.limit)
  }

  /// Canonical key for this query.
  pub fn key(&self) -> CacheKey {
    encode(self)
  }
}

/// Stable string identity of a [`ListQuery`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(String);

impl CacheKey {
  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Short SHA-256 prefix, for log lines where the full key is noisy.
  pub fn digest(&self) -> String {
    let hash = Sha256::digest(self.0.as_bytes());
    hex::encode(&hash[..6])
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Encode a query as `{"filters":{..sorted..},"limit":L,"page":P}`.
pub fn encode(query: &ListQuery) -> CacheKey {
  // BTreeMap serializes its fields in name order.
  let canonical = serde_json::json!({
    "filters": query.filters,
    "limit": query.limit,
    "page": query.page,
  });
  CacheKey(canonical.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_filter_order_does_not_change_key() {
    let a = ListQuery::new(1, 10)
      .filter("category", "shoes")
      .filter("in_stock", true);
    let b = ListQuery::new(1, 10)
      .filter("in_stock", true)
      .filter("category", "shoes");

    assert_eq!(a.key(), b.key());
  }

  #[test]
  fn test_null_filter_matches_absent() {
    let plain = ListQuery::new(2, 20).filter("category", "shoes");
    let with_null = ListQuery::new(2, 20)
      .filter("category", "shoes")
      .filter("brand", Value::Null)
      .filter("search", None::<String>);

    assert_eq!(plain.key(), with_null.key());
    assert_eq!(plain, with_null);
  }

  #[test]
  fn test_different_filter_values_differ() {
    let a = ListQuery::new(1, 10).filter("category", "shoes");
    let b = ListQuery::new(1, 10).filter("category", "hats");
    let c = ListQuery::new(1, 10).filter("category", 1);
    let d = ListQuery::new(1, 10).filter("category", "1");

    assert_ne!(a.key(), b.key());
    assert_ne!(c.key(), d.key());
  }

  #[test]
  fn test_pagination_is_part_of_key() {
    let base = ListQuery::new(1, 10);
    assert_ne!(base.key(), ListQuery::new(2, 10).key());
    assert_ne!(base.key(), ListQuery::new(1, 5).key());
  }

  #[test]
  fn test_filter_named_page_does_not_collide() {
    let a = ListQuery::new(1, 10).filter("page", 2);
    let b = ListQuery::new(2, 10);
    assert_ne!(a.key(), b.key());
  }

  #[test]
  fn test_key_format() {
    let query = ListQuery::new(3, 5).filter("b", 1).filter("a", "x");
    assert_eq!(
      query.key().as_str(),
      r#"{"filters":{"a":"x","b":1},"limit":5,"page":3}"#
    );
  }

  #[test]
  fn test_zero_pagination_is_clamped() {
    let query = ListQuery::new(0, 0);
    assert_eq!(query.page(), 1);
    assert_eq!(query.limit(), 1);
    assert_eq!(query.offset(), 0);
  }

  #[test]
  fn test_digest_is_short_and_stable() {
    let key = ListQuery::new(1, 10).key();
    assert_eq!(key.digest().len(), 12);
    assert_eq!(key.digest(), ListQuery::new(1, 10).key().digest());
  }
}
