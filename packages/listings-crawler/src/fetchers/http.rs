//! reqwest-backed fetcher with optional proxy rotation.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::traits::fetcher::Fetcher;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Fetches JSON over HTTP, rotating across one client per proxy.
pub struct HttpFetcher {
    clients: Vec<reqwest::Client>,
    next: AtomicUsize,
}

impl HttpFetcher {
    /// Direct connection, no proxy.
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            clients: vec![client],
            next: AtomicUsize::new(0),
        })
    }

    /// One client per proxy, used round-robin. An empty list means direct.
    pub fn with_proxies(user_agent: &str, proxies: &[Url]) -> Result<Self, reqwest::Error> {
        if proxies.is_empty() {
            return Self::new(user_agent);
        }

        let clients = proxies
            .iter()
            .map(|proxy| {
                reqwest::Client::builder()
                    .user_agent(user_agent)
                    .proxy(reqwest::Proxy::all(proxy.as_str())?)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            clients,
            next: AtomicUsize::new(0),
        })
    }

    fn client(&self) -> &reqwest::Client {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        &self.clients[index]
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_json(&self, url: &Url) -> FetchResult<Value> {
        let resp = self
            .client()
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| classify(url, e))?;
        debug!(url = %url, status = status.as_u16(), bytes = body.len(), "fetched");

        interpret(url, status.as_u16(), &body)
    }
}

fn classify(url: &Url, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            source: Box::new(err),
        }
    }
}

/// Turn a status and body into a result.
///
/// Client errors that carry a JSON body are API error payloads (for example
/// the delisted marker) and are handed back to the caller as `Ok`.
fn interpret(url: &Url, status: u16, body: &str) -> FetchResult<Value> {
    let parsed = serde_json::from_str::<Value>(body);

    if (200..300).contains(&status) {
        return parsed.map_err(|e| FetchError::malformed(url.as_str(), e.to_string()));
    }

    let rejected = FetchError::Status {
        url: url.to_string(),
        status,
    };
    match parsed {
        Ok(value) if (400..500).contains(&status) && !rejected.is_transient() => Ok(value),
        _ => Err(rejected),
    }
}
