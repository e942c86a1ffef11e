//! Price-range partitioning ("pivoting").
//!
//! A search exposes at most `cap_per_query` results over at most
//! `max_page_depth` pages. The partitioner looks at one executed page and
//! decides whether to keep paginating the same range, to split the range in
//! two, or to stop. It is pure: recursion happens by the orchestrator
//! enqueueing the returned queries, never on the call stack.

use crate::types::config::EnumerationConfig;
use crate::types::query::Query;
use crate::types::response::SearchPage;

/// Listings a leaf range could not expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Undercount {
    pub total_count: u64,
    /// Listings reachable through pagination of this range.
    pub reachable: u64,
}

impl Undercount {
    pub fn missing(&self) -> u64 {
        self.total_count.saturating_sub(self.reachable)
    }
}

/// Outcome of inspecting one search page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Fetch the next page of the same range.
    Continue { next: Query },
    /// Replace the range with two disjoint halves, both at offset 0.
    Split { lower: Query, upper: Query },
    /// Nothing more to fetch for this range.
    LeafExhausted { undercount: Option<Undercount> },
}

impl Action {
    /// Whether listings on the inspected page belong to the final result.
    ///
    /// A split discards the page: both halves will surface its listings again.
    pub fn keeps_page(&self) -> bool {
        !matches!(self, Action::Split { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Partitioner {
    cap: u64,
    page_size: u32,
    max_page_depth: u32,
    min_split_width: u32,
}

impl Partitioner {
    pub fn new(config: &EnumerationConfig) -> Self {
        Self {
            cap: u64::from(config.cap_per_query),
            page_size: config.page_size.max(1),
            max_page_depth: config.max_page_depth.max(1),
            min_split_width: config.min_split_width.max(1),
        }
    }

    /// Decide what to do after executing `query` and observing `page`.
    pub fn decide(&self, query: &Query, page: &SearchPage) -> Action {
        let depth = query.page_depth(self.page_size);
        let depth_exhausted = depth >= self.max_page_depth;
        let overflow = page.total_count > self.cap || (depth_exhausted && page.has_more_pages);

        if overflow {
            if let Some((lower, upper)) = query.price.bisect(self.min_split_width) {
                return Action::Split {
                    lower: query.with_price(lower),
                    upper: query.with_price(upper),
                };
            }
        }

        if page.has_more_pages && !depth_exhausted {
            return Action::Continue {
                next: query.at_offset(query.offset + self.page_size),
            };
        }

        let seen = u64::from(query.offset) + page.listings.len() as u64;
        let undercount = (overflow && page.total_count > seen).then_some(Undercount {
            total_count: page.total_count,
            reachable: seen,
        });
        Action::LeafExhausted { undercount }
    }
}
