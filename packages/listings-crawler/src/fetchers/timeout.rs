//! Per-call time budget.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::traits::fetcher::Fetcher;

/// Fails any single call that runs longer than `timeout` with
/// [`FetchError::Timeout`].
pub struct TimeoutFetcher<F: Fetcher> {
    inner: F,
    timeout: Duration,
}

impl<F: Fetcher> TimeoutFetcher<F> {
    pub fn new(fetcher: F, timeout: Duration) -> Self {
        Self {
            inner: fetcher,
            timeout,
        }
    }
}

#[async_trait]
impl<F: Fetcher> Fetcher for TimeoutFetcher<F> {
    async fn fetch_json(&self, url: &Url) -> FetchResult<Value> {
        tokio::time::timeout(self.timeout, self.inner.fetch_json(url))
            .await
            .map_err(|_| FetchError::Timeout {
                url: url.to_string(),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetchers::FetcherExt;
    use crate::testing::MockFetcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let fetcher = MockFetcher::new()
            .with_default(json!({}))
            .with_delay(Duration::from_millis(500))
            .with_timeout(Duration::from_millis(20));
        let url = Url::parse("https://api.test/slow").unwrap();

        let err = fetcher.fetch_json(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_fast_call_passes_through() {
        let fetcher = MockFetcher::new()
            .with_default(json!({"ok": 1}))
            .with_timeout(Duration::from_secs(1));
        let url = Url::parse("https://api.test/fast").unwrap();
        assert_eq!(fetcher.fetch_json(&url).await.unwrap()["ok"], 1);
    }
}
