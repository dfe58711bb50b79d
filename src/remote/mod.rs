//! HTTP access to the remote list endpoint.

pub mod api_types;
pub mod cached_client;
pub mod client;

pub use cached_client::CachedListClient;
pub use client::{Endpoint, HttpListClient};
