//! Fetch boundary trait.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

use crate::error::FetchResult;

/// Performs one HTTP request and returns the parsed JSON body.
///
/// Implementations own session and proxy handling. Errors must be classified
/// through [`crate::FetchError::is_transient`]; a non-success response with a
/// JSON body may be returned as `Ok` so callers can inspect API error payloads.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_json(&self, url: &Url) -> FetchResult<Value>;
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn fetch_json(&self, url: &Url) -> FetchResult<Value> {
        (**self).fetch_json(url).await
    }
}
