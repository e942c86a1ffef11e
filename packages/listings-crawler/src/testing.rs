//! Testing utilities including mock implementations.
//!
//! These are useful for exercising the crawler without making real network
//! calls: [`MockFetcher`] answers scripted payloads by URL path, and
//! [`MockMarketplace`] simulates a capped search API over a fixed set of
//! priced listings.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::traits::fetcher::Fetcher;
use crate::types::response::UNAVAILABLE_MESSAGE;

#[derive(Debug, Clone)]
enum MockResponse {
    Json(Value),
    Status(u16),
}

impl MockResponse {
    fn into_result(self, url: &Url) -> FetchResult<Value> {
        match self {
            MockResponse::Json(value) => Ok(value),
            MockResponse::Status(status) => Err(FetchError::Status {
                url: url.to_string(),
                status,
            }),
        }
    }
}

/// A fetcher that answers by exact URL path.
///
/// Scripted one-shot responses (see [`MockFetcher::fail_times`]) are served
/// before the path's standing response. Unknown paths fall back to the
/// default response, or to HTTP 404.
#[derive(Default)]
pub struct MockFetcher {
    routes: RwLock<HashMap<String, MockResponse>>,
    scripted: RwLock<HashMap<String, VecDeque<MockResponse>>>,
    default: Option<Value>,
    delay: Option<Duration>,
    calls: Arc<RwLock<Vec<Url>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `path` with `value`.
    pub fn on_path(self, path: impl Into<String>, value: Value) -> Self {
        self.routes
            .write()
            .unwrap()
            .insert(path.into(), MockResponse::Json(value));
        self
    }

    /// Always fail `path` with HTTP `status`.
    pub fn fail_path(self, path: impl Into<String>, status: u16) -> Self {
        self.routes
            .write()
            .unwrap()
            .insert(path.into(), MockResponse::Status(status));
        self
    }

    /// Fail the next `times` calls to `path` with HTTP `status`.
    pub fn fail_times(self, path: impl Into<String>, times: usize, status: u16) -> Self {
        self.scripted
            .write()
            .unwrap()
            .entry(path.into())
            .or_default()
            .extend(std::iter::repeat(MockResponse::Status(status)).take(times));
        self
    }

    /// Answer unknown paths with `value`.
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Sleep before answering every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get all URLs fetched so far.
    pub fn calls(&self) -> Vec<Url> {
        self.calls.read().unwrap().clone()
    }

    /// Shared call log, still readable after the mock is moved into a wrapper.
    pub fn calls_handle(&self) -> Arc<RwLock<Vec<Url>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch_json(&self, url: &Url) -> FetchResult<Value> {
        self.calls.write().unwrap().push(url.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let path = url.path();
        let scripted = self
            .scripted
            .write()
            .unwrap()
            .get_mut(path)
            .and_then(|queue| queue.pop_front());
        if let Some(response) = scripted {
            return response.into_result(url);
        }

        let standing = self.routes.read().unwrap().get(path).cloned();
        match (standing, &self.default) {
            (Some(response), _) => response.into_result(url),
            (None, Some(value)) => Ok(value.clone()),
            (None, None) => MockResponse::Status(404).into_result(url),
        }
    }
}

/// A simulated marketplace whose search exposes at most `cap` results.
///
/// Listings are `(id, price)` pairs. An id added at several prices shows up in
/// every range containing one of them, which is how overlapping leaves are
/// simulated. Search results are ordered by id; pricing quotes always carry a
/// rate so no booking-details calls are made.
pub struct MockMarketplace {
    cap: u64,
    listings: RwLock<Vec<(u64, u32)>>,
    unavailable: RwLock<HashSet<u64>>,
    broken: RwLock<HashSet<u64>>,
    flaky: RwLock<HashMap<u64, usize>>,
    search_calls: RwLock<Vec<(u32, u32, u32)>>,
    detail_calls: RwLock<Vec<u64>>,
}

impl MockMarketplace {
    pub fn new(cap: u64) -> Self {
        Self {
            cap,
            listings: RwLock::new(Vec::new()),
            unavailable: RwLock::new(HashSet::new()),
            broken: RwLock::new(HashSet::new()),
            flaky: RwLock::new(HashMap::new()),
            search_calls: RwLock::new(Vec::new()),
            detail_calls: RwLock::new(Vec::new()),
        }
    }

    pub fn with_listing(self, id: u64, price: u32) -> Self {
        self.listings.write().unwrap().push((id, price));
        self
    }

    /// Add `count` listings with consecutive ids starting at `first_id`, all at `price`.
    pub fn with_listings_at(self, first_id: u64, count: u64, price: u32) -> Self {
        self.listings
            .write()
            .unwrap()
            .extend((first_id..first_id + count).map(|id| (id, price)));
        self
    }

    /// Add `count` listings with prices spread evenly over `[min, max]`.
    pub fn with_spread(self, first_id: u64, count: u64, min: u32, max: u32) -> Self {
        let span = u64::from(max - min);
        self.listings.write().unwrap().extend((0..count).map(|i| {
            let price = min + (span * i / count.max(1)) as u32;
            (first_id + i, price)
        }));
        self
    }

    /// Detail answers with the delisted marker.
    pub fn with_unavailable(self, id: u64) -> Self {
        self.unavailable.write().unwrap().insert(id);
        self
    }

    /// Detail always fails with HTTP 503.
    pub fn with_broken_detail(self, id: u64) -> Self {
        self.broken.write().unwrap().insert(id);
        self
    }

    /// Detail fails with HTTP 503 for the first `times` calls.
    pub fn with_flaky_detail(self, id: u64, times: usize) -> Self {
        self.flaky.write().unwrap().insert(id, times);
        self
    }

    /// `(min, max, offset)` of every search executed.
    pub fn search_calls(&self) -> Vec<(u32, u32, u32)> {
        self.search_calls.read().unwrap().clone()
    }

    /// Listing ids of every detail call.
    pub fn detail_calls(&self) -> Vec<u64> {
        self.detail_calls.read().unwrap().clone()
    }

    fn search(&self, url: &Url) -> FetchResult<Value> {
        let min: u32 = param(url, "price_min")?;
        let max: u32 = param(url, "price_max")?;
        let offset: u32 = param(url, "items_offset")?;
        let per_page: u32 = param(url, "items_per_grid")?;
        self.search_calls.write().unwrap().push((min, max, offset));

        let matching: BTreeSet<u64> = self
            .listings
            .read()
            .unwrap()
            .iter()
            .filter(|(_, price)| (min..=max).contains(price))
            .map(|(id, _)| *id)
            .collect();

        let total = matching.len() as u64;
        let reachable = total.min(self.cap) as usize;
        let start = (offset as usize).min(reachable);
        let end = (start + per_page as usize).min(reachable);

        let page: Vec<Value> = matching
            .iter()
            .skip(start)
            .take(end - start)
            .map(|id| {
                json!({
                    "listing": {"id": id, "name": format!("Listing {id}")},
                    "pricing_quote": {"rate": {"amount": min}}
                })
            })
            .collect();

        Ok(json!({"explore_tabs": [{
            "home_tab_metadata": {"listings_count": total},
            "pagination_metadata": {"has_next_page": end < reachable, "items_offset": end},
            "sections": [{"listings": page}]
        }]}))
    }

    fn detail(&self, url: &Url, id: u64) -> FetchResult<Value> {
        self.detail_calls.write().unwrap().push(id);

        let unavailable_status = FetchError::Status {
            url: url.to_string(),
            status: 503,
        };
        if self.broken.read().unwrap().contains(&id) {
            return Err(unavailable_status);
        }
        if let Some(remaining) = self.flaky.write().unwrap().get_mut(&id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(unavailable_status);
            }
        }
        if self.unavailable.read().unwrap().contains(&id) {
            return Ok(json!({"error_message": UNAVAILABLE_MESSAGE}));
        }

        Ok(json!({"pdp_listing_detail": {
            "id": id,
            "p3_summary_title": format!("Listing {id}"),
            "guest_label": "2 guests",
            "bedroom_label": "1 bedroom",
            "photos": [],
            "listing_amenities": []
        }}))
    }
}

fn param<T: std::str::FromStr>(url: &Url, name: &str) -> FetchResult<T> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .and_then(|(_, value)| value.parse().ok())
        .ok_or_else(|| FetchError::malformed(url.as_str(), format!("missing {name}")))
}

#[async_trait]
impl Fetcher for MockMarketplace {
    async fn fetch_json(&self, url: &Url) -> FetchResult<Value> {
        let path = url.path();
        if path.ends_with("/explore_tabs") {
            return self.search(url);
        }
        if path.ends_with("/reviews") {
            return Ok(json!({"reviews": [], "metadata": {"reviews_count": 0}}));
        }
        if let Some(id) = path
            .rsplit_once("/pdp_listings/")
            .and_then(|(_, id)| id.parse::<u64>().ok())
        {
            return self.detail(url, id);
        }
        MockResponse::Status(404).into_result(url)
    }
}
