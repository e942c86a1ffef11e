//! Fetcher implementations and wrappers.

pub mod http;
pub mod rate_limited;
pub mod timeout;

pub use http::HttpFetcher;
pub use rate_limited::{FetcherExt, RateLimitedFetcher};
pub use timeout::TimeoutFetcher;
