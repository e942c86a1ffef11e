//! Cap-Aware Listings Crawler
//!
//! Enumerates every rental listing matching a location/date/price query from
//! a marketplace whose search API caps each query's visible results.
//!
//! # Approach
//!
//! **Pivot on price until every range fits under the cap**
//!
//! - A search that reports more results than the cap is split into two
//!   disjoint price halves, each searched again
//! - Ranges that fit are paginated to completion and their listings resolved
//! - Ranges too narrow to split are drained and the shortfall is reported
//! - A shared budget stops the run once enough listings are emitted
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use listings_crawler::{ApiEndpoints, CrawlInput, HttpFetcher, JsonlSink, Orchestrator};
//! use listings_crawler::fetchers::FetcherExt;
//!
//! let input: CrawlInput = serde_json::from_str(&raw)?;
//! input.validate()?;
//!
//! let fetcher = HttpFetcher::new(DEFAULT_USER_AGENT)?.rate_limited(10);
//! let sink = Arc::new(JsonlSink::open("output").await?);
//! let orchestrator = Orchestrator::new(
//!     fetcher,
//!     ApiEndpoints::new(base_url, api_key)?,
//!     sink,
//!     input.to_enumeration_config(),
//!     input.to_detail_options()?,
//! );
//! orchestrator.seed(input.seed_units()?).await?;
//! let summary = Arc::new(orchestrator).run().await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Seams to the outside world (Fetcher, WorkQueue, RecordSink, StateStore)
//! - [`types`] - Queries, work units, listing records and API response schemas
//! - [`pipeline`] - Partitioner, budget controller, detail mapping and orchestrator
//! - [`fetchers`] - HTTP fetcher plus rate-limit and timeout wrappers
//! - [`stores`] - Work queue and run-state storage
//! - [`sinks`] - Output sinks (JSON lines, memory)
//! - [`testing`] - Mock fetcher and simulated marketplace

pub mod api;
pub mod config;
pub mod error;
pub mod fetchers;
pub mod input;
pub mod pipeline;
pub mod sinks;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use api::ApiEndpoints;
pub use error::{CrawlError, FetchError, InputError, SinkError, StoreError};
pub use input::CrawlInput;
pub use traits::{
    fetcher::Fetcher,
    queue::WorkQueue,
    sink::RecordSink,
    store::{RunState, StateStore},
};
pub use types::{
    config::{DetailOptions, EnumerationConfig},
    listing::{ListingRecord, ListingSummary},
    output::OutputRecord,
    query::{PriceRange, Query},
    work::{DetailContext, FailedWorkRecord, FailureKind, WorkKind, WorkUnit},
};

// Re-export pipeline components
pub use pipeline::{
    Action, BudgetController, BudgetSnapshot, DetailMapper, DetailOutcome, EmitPermit,
    Orchestrator, Partitioner, RunSummary, Undercount,
};

// Re-export implementations
pub use fetchers::{HttpFetcher, RateLimitedFetcher, TimeoutFetcher};
pub use sinks::{JsonlSink, MemorySink};
pub use stores::{FileStateStore, MemoryStateStore, MemoryWorkQueue};

// Re-export testing utilities
pub use testing::{MockFetcher, MockMarketplace};
