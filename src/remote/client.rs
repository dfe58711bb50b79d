use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::RequestBuilder;
use serde_json::Value;
use url::Url;

use crate::cache::{FetchError, ListPage, ListQuery, ListSource};
use crate::config::EndpointConfig;
use crate::remote::api_types::{error_message, ApiListResponse};

/// Where the list endpoint and its mutation routes live.
#[derive(Debug, Clone)]
pub struct Endpoint {
  base: Url,
  bulk_path: String,
}

impl Endpoint {
  pub fn parse(config: &EndpointConfig) -> Result<Self> {
    let base = Url::parse(&config.url)
      .map_err(|e| eyre!("Invalid endpoint URL {}: {}", config.url, e))?;
    if base.cannot_be_a_base() {
      return Err(eyre!("Endpoint URL {} cannot have sub-paths", config.url));
    }

    Ok(Self {
      base,
      bulk_path: config.bulk_path.clone(),
    })
  }

  pub fn base(&self) -> &Url {
    &self.base
  }

  /// `{base}?page=..&limit=..&<filter>=<value>..`
  pub fn list_url(&self, query: &ListQuery) -> Url {
    let mut url = self.base.clone();
    {
      let mut pairs = url.query_pairs_mut();
      pairs.append_pair("page", &query.page().to_string());
      pairs.append_pair("limit", &query.limit().to_string());
      for (name, value) in query.filters() {
        let text = match value {
          Value::String(s) => s.clone(),
          other => other.to_string(),
        };
        pairs.append_pair(name, &text);
      }
    }
    url
  }

  /// `{base}/{segment}`
  pub fn child_url(&self, segment: &str) -> Result<Url, FetchError> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| FetchError::new(format!("Endpoint URL {} cannot have sub-paths", self.base)))?
      .pop_if_empty()
      .push(segment);
    Ok(url)
  }

  pub fn bulk_url(&self) -> Result<Url, FetchError> {
    self.child_url(&self.bulk_path)
  }
}

/// HTTP client for one list endpoint and its mutations.
#[derive(Clone)]
pub struct HttpListClient {
  http: reqwest::Client,
  endpoint: Endpoint,
}

impl HttpListClient {
  pub fn new(config: &EndpointConfig) -> Result<Self> {
    let endpoint = Endpoint::parse(config)?;
    let http = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, endpoint })
  }

  pub fn endpoint(&self) -> &Endpoint {
    &self.endpoint
  }

  /// Get one page of records.
  pub async fn fetch_page(&self, query: &ListQuery) -> Result<ListPage<Value>, FetchError> {
    let body = send(self.http.get(self.endpoint.list_url(query))).await?;
    let response: ApiListResponse = serde_json::from_str(&body)
      .map_err(|e| FetchError::new(format!("Failed to parse list response: {}", e)))?;
    Ok(response.into_page(query))
  }

  /// Create a record, returning what the server stored.
  pub async fn create(&self, record: &Value) -> Result<Value, FetchError> {
    let request = with_json(self.http.post(self.endpoint.base().clone()), record)?;
    parse_body(&send(request).await?)
  }

  /// Replace fields of the record with `id`.
  pub async fn update(&self, id: &str, record: &Value) -> Result<Value, FetchError> {
    let request = with_json(self.http.patch(self.endpoint.child_url(id)?), record)?;
    parse_body(&send(request).await?)
  }

  pub async fn delete(&self, id: &str) -> Result<(), FetchError> {
    send(self.http.delete(self.endpoint.child_url(id)?)).await?;
    Ok(())
  }

  /// Create many records in one request.
  pub async fn bulk_import(&self, records: &[Value]) -> Result<Value, FetchError> {
    let url = self.endpoint.bulk_url()?;
    let request = with_json(self.http.post(url), &records)?;
    parse_body(&send(request).await?)
  }
}

impl ListSource<Value> for HttpListClient {
  fn list(&self, query: &ListQuery) -> BoxFuture<'static, Result<ListPage<Value>, FetchError>> {
    let client = self.clone();
    let query = query.clone();
    async move { client.fetch_page(&query).await }.boxed()
  }
}

impl From<reqwest::Error> for FetchError {
  fn from(e: reqwest::Error) -> Self {
    Self {
      status: e.status().map(|s| s.as_u16()),
      message: e.to_string(),
    }
  }
}

fn with_json(
  request: RequestBuilder,
  body: &impl serde::Serialize,
) -> Result<RequestBuilder, FetchError> {
  let bytes = serde_json::to_vec(body)
    .map_err(|e| FetchError::new(format!("Failed to serialize request: {}", e)))?;
  Ok(request.header(CONTENT_TYPE, "application/json").body(bytes))
}

/// Send a request, turning non-2xx responses into errors carrying the status.
async fn send(request: RequestBuilder) -> Result<String, FetchError> {
  let response = request.send().await?;
  let status = response.status();
  let body = response.text().await?;

  if !status.is_success() {
    return Err(FetchError::with_status(status.as_u16(), error_message(&body)));
  }
  Ok(body)
}

fn parse_body(body: &str) -> Result<Value, FetchError> {
  if body.trim().is_empty() {
    return Ok(Value::Null);
  }
  serde_json::from_str(body).map_err(|e| FetchError::new(format!("Failed to parse response: {}", e)))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn endpoint(url: &str) -> Endpoint {
    Endpoint::parse(&EndpointConfig {
      url: url.to_string(),
      bulk_path: "import".to_string(),
    })
    .unwrap()
  }

  #[test]
  fn test_list_url_encodes_paging_and_filters() {
    let endpoint = endpoint("https://api.example.com/products");
    let query = ListQuery::new(2, 25)
      .filter("category", "shoes & socks")
      .filter("in_stock", true)
      .filter("min_price", 10);

    assert_eq!(
      endpoint.list_url(&query).as_str(),
      "https://api.example.com/products?page=2&limit=25&category=shoes+%26+socks&in_stock=true&min_price=10"
    );
  }

  #[test]
  fn test_list_url_keeps_existing_query() {
    let endpoint = endpoint("https://api.example.com/products?tenant=a");
    let url = endpoint.list_url(&ListQuery::new(1, 10));
    assert_eq!(url.query(), Some("tenant=a&page=1&limit=10"));
  }

  #[test]
  fn test_child_urls() {
    let endpoint = endpoint("https://api.example.com/products/");
    assert_eq!(
      endpoint.child_url("sku 1").unwrap().as_str(),
      "https://api.example.com/products/sku%201"
    );
    assert_eq!(
      endpoint.bulk_url().unwrap().as_str(),
      "https://api.example.com/products/import"
    );
  }

  #[test]
  fn test_rejects_bad_endpoint() {
    let config = EndpointConfig {
      url: "not a url".to_string(),
      bulk_path: "bulk".to_string(),
    };
    assert!(Endpoint::parse(&config).is_err());

    let config = EndpointConfig {
      url: "mailto:someone@example.com".to_string(),
      bulk_path: "bulk".to_string(),
    };
    assert!(Endpoint::parse(&config).is_err());
  }

  #[test]
  fn test_parse_body() {
    assert_eq!(parse_body("").unwrap(), Value::Null);
    assert_eq!(parse_body(r#"{"id":3}"#).unwrap()["id"], 3);
    assert!(parse_body("<html>").is_err());
  }
}
