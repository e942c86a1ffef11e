//! Typed errors for the listings crawler.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so the orchestrator can
//! classify failures and decide between retrying and dead-lettering.

use thiserror::Error;

use crate::types::work::FailureKind;

/// Errors raised by the fetch boundary for a single HTTP call.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level failure (connect, reset, TLS, proxy)
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The call did not finish within its time budget
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// Non-success HTTP status without a usable JSON body
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Response body could not be interpreted
    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

impl FetchError {
    /// Whether a retry of the same call is plausible.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network { .. } | FetchError::Timeout { .. } | FetchError::Malformed { .. } => {
                true
            }
            FetchError::Status { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
        }
    }

    pub fn malformed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        FetchError::Malformed {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// Errors that terminate the processing of one work unit.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Fetch boundary failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Detail payload had neither a detail object nor the unavailable marker
    #[error("unable to get details for listing {listing_id}, raw response stored as {key}")]
    UnexpectedDetail { listing_id: String, key: String },

    /// Detail object present but not decodable
    #[error("malformed detail for listing {listing_id} ({reason}), raw response stored as {key}")]
    MalformedDetail {
        listing_id: String,
        key: String,
        reason: String,
    },

    /// Output sink rejected a record
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Derived work could not be enqueued
    #[error("queue error: {0}")]
    Queue(#[from] StoreError),
}

impl CrawlError {
    /// Retry classification used by the orchestrator.
    pub fn kind(&self) -> FailureKind {
        match self {
            CrawlError::Fetch(e) if e.is_transient() => FailureKind::Retryable,
            CrawlError::Fetch(_) => FailureKind::NonRetryable,
            CrawlError::UnexpectedDetail { .. } | CrawlError::MalformedDetail { .. } => {
                FailureKind::NonRetryable
            }
            CrawlError::Sink(_) | CrawlError::Queue(_) => FailureKind::Retryable,
        }
    }
}

/// Input validation failures. These are startup preconditions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("either locationQuery or startUrls must be provided")]
    MissingLocation,

    #[error("minPrice ({min}) must not exceed maxPrice ({max})")]
    InvertedPriceRange { min: u32, max: u32 },

    #[error("invalid {field} date: {value} (expected YYYY-MM-DD)")]
    InvalidDate { field: &'static str, value: String },

    #[error("checkIn and checkOut must be provided together")]
    UnpairedDates,

    #[error("checkOut ({check_out}) must be after checkIn ({check_in})")]
    InvertedDates { check_in: String, check_out: String },

    #[error("maxConcurrency must be greater than zero")]
    ZeroConcurrency,

    #[error("invalid proxy URL: {0}")]
    InvalidProxy(String),
}

/// Output persistence failures.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Run-state persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for unit processing.
pub type CrawlResult<T> = std::result::Result<T, CrawlError>;

/// Result type alias for sink operations.
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Result type alias for state persistence.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
