//! Serde-deserializable types matching list endpoint responses.
//!
//! Endpoints disagree on naming (`records` vs `data`, `totalCount` vs
//! `total`) and some omit paging fields entirely, so responses land here
//! first and are normalized into [`ListPage`].

use serde::Deserialize;
use serde_json::Value;

use crate::cache::{total_pages, ListPage, ListQuery};

// ============================================================================
// List endpoint response
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiListResponse {
  #[serde(default, alias = "data", alias = "items")]
  pub records: Vec<Value>,
  #[serde(alias = "total", alias = "count")]
  pub total_count: Option<u64>,
  pub page: Option<u32>,
  pub limit: Option<u32>,
  pub total_pages: Option<u32>,
}

impl ApiListResponse {
  /// Fill in whatever paging metadata the endpoint left out from the query.
  pub fn into_page(self, query: &ListQuery) -> ListPage<Value> {
    let total_count = self
      .total_count
      .unwrap_or_else(|| query.offset() + self.records.len() as u64);
    let limit = self.limit.unwrap_or(query.limit());

    ListPage {
      total_pages: self
        .total_pages
        .unwrap_or_else(|| total_pages(total_count, limit)),
      records: self.records,
      total_count,
      page: self.page.unwrap_or(query.page()),
      limit,
    }
  }
}

// ============================================================================
// Error body
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  pub message: Option<String>,
  pub error: Option<String>,
}

/// Best human-readable message in an error response body.
pub fn error_message(body: &str) -> String {
  serde_json::from_str::<ApiErrorBody>(body)
    .ok()
    .and_then(|parsed| parsed.message.or(parsed.error))
    .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_full_response() {
    let response: ApiListResponse = serde_json::from_str(
      r#"{"records":[{"id":1}],"totalCount":41,"page":2,"limit":20,"totalPages":3}"#,
    )
    .unwrap();
    let page = response.into_page(&ListQuery::new(2, 20));

    assert_eq!(page.records.len(), 1);
    assert_eq!(page.total_count, 41);
    assert_eq!(page.total_pages, 3);
  }

  #[test]
  fn test_sparse_response_uses_query() {
    let response: ApiListResponse =
      serde_json::from_str(r#"{"data":[{"id":1},{"id":2}],"total":12}"#).unwrap();
    let page = response.into_page(&ListQuery::new(3, 5));

    assert_eq!(page.records.len(), 2);
    assert_eq!(page.total_count, 12);
    assert_eq!(page.page, 3);
    assert_eq!(page.limit, 5);
    assert_eq!(page.total_pages, 3);
  }

  #[test]
  fn test_missing_total_counts_records() {
    let response: ApiListResponse = serde_json::from_str(r#"{"items":[1,2,3]}"#).unwrap();
    let page = response.into_page(&ListQuery::new(2, 10));
    assert_eq!(page.total_count, 13);
  }

  #[test]
  fn test_error_message() {
    assert_eq!(error_message(r#"{"message":"plan not configured"}"#), "plan not configured");
    assert_eq!(error_message(r#"{"error":"nope"}"#), "nope");
    assert_eq!(error_message("Bad Gateway\n"), "Bad Gateway");
  }
}
