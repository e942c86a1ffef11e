//! Configuration types for enumeration and detail mapping.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Knobs consumed by the partitioner and the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumerationConfig {
    /// Maximum number of results a single search exposes.
    ///
    /// Default: 300.
    pub cap_per_query: u32,

    /// Listings requested per search page.
    ///
    /// Default: 50.
    pub page_size: u32,

    /// Deepest page a single search can be paginated to.
    ///
    /// Default: 6 (`cap_per_query / page_size`).
    pub max_page_depth: u32,

    /// Smallest price width (`max - min`) that may still be split.
    ///
    /// Narrower ranges are paginated as leaves even when they overflow the
    /// cap, and the missing listings are reported as an undercount.
    /// Default: 2, i.e. a range is split only if its midpoint differs from
    /// both bounds.
    pub min_split_width: u32,

    /// Re-attempts after the first failed attempt of a unit.
    ///
    /// Default: 2.
    pub max_retries: u32,

    /// Number of concurrent workers.
    ///
    /// Default: 20.
    pub worker_count: usize,

    /// Time budget of every individual I/O call.
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    /// How often run state is persisted.
    #[serde(with = "duration_secs")]
    pub persist_interval: Duration,

    /// Stop after emitting this many listings (unbounded when `None`).
    pub max_listings: Option<u64>,
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            cap_per_query: 300,
            page_size: 50,
            max_page_depth: 6,
            min_split_width: 2,
            max_retries: 2,
            worker_count: 20,
            request_timeout: Duration::from_secs(60),
            persist_interval: Duration::from_secs(60),
            max_listings: None,
        }
    }
}

impl EnumerationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cap(mut self, cap: u32) -> Self {
        self.cap_per_query = cap;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_max_page_depth(mut self, depth: u32) -> Self {
        self.max_page_depth = depth.max(1);
        self
    }

    pub fn with_min_split_width(mut self, width: u32) -> Self {
        self.min_split_width = width.max(1);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_count = workers.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_persist_interval(mut self, interval: Duration) -> Self {
        self.persist_interval = interval;
        self
    }

    pub fn with_max_listings(mut self, max: u64) -> Self {
        self.max_listings = Some(max);
        self
    }
}

/// Options for mapping and enriching listing details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailOptions {
    /// Emit the compact record only (no full raw detail).
    pub simple: bool,
    pub include_reviews: bool,
    pub max_reviews: u32,
    /// Months of availability calendar to fetch (0 disables the calendar).
    pub calendar_months: u32,
    pub add_more_host_info: bool,
    /// "City, Country" search string, used to derive city and country.
    pub location_query: Option<String>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    /// Opaque values copied into every record.
    pub value_pairs: Option<serde_json::Value>,
}

impl Default for DetailOptions {
    fn default() -> Self {
        Self {
            simple: true,
            include_reviews: true,
            max_reviews: 10,
            calendar_months: 0,
            add_more_host_info: false,
            location_query: None,
            check_in: None,
            check_out: None,
            value_pairs: None,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let config = EnumerationConfig::default();
        assert_eq!(config.cap_per_query, config.page_size * config.max_page_depth);
        assert_eq!(config.max_retries, 2);
        assert!(config.max_listings.is_none());
    }

    #[test]
    fn test_builder_clamps() {
        let config = EnumerationConfig::new()
            .with_workers(0)
            .with_page_size(0)
            .with_min_split_width(0);
        assert_eq!(config.worker_count, 1);
        assert_eq!(config.page_size, 1);
        assert_eq!(config.min_split_width, 1);
    }
}
