//! Work units flowing through the orchestrator queue.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::listing::ListingSummary;
use super::query::Query;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transient error - will retry if attempts remain
    #[default]
    Retryable,
    /// Permanent error - will not retry
    NonRetryable,
}

impl FailureKind {
    pub fn should_retry(&self) -> bool {
        matches!(self, FailureKind::Retryable)
    }
}

/// Search context a detail unit was derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailContext {
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub locale: Option<String>,
    /// Price range of the leaf query that surfaced the listing
    #[serde(default)]
    pub origin_range: Option<super::query::PriceRange>,
}

impl DetailContext {
    pub fn from_query(query: &Query) -> Self {
        Self {
            check_in: query.check_in,
            check_out: query.check_out,
            locale: Some(query.locale.clone()),
            origin_range: Some(query.price),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkKind {
    /// Probe a (possibly freshly split) price range at offset 0
    Pivot { query: Query },
    /// Fetch a subsequent page of a range that fits under the cap
    SearchPage { query: Query },
    /// Resolve a single listing
    DetailFetch {
        listing: ListingSummary,
        context: DetailContext,
    },
}

impl WorkKind {
    pub fn name(&self) -> &'static str {
        match self {
            WorkKind::Pivot { .. } => "pivot",
            WorkKind::SearchPage { .. } => "search_page",
            WorkKind::DetailFetch { .. } => "detail_fetch",
        }
    }
}

/// A unit of work plus its retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub id: Uuid,
    pub kind: WorkKind,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

impl WorkUnit {
    fn from_kind(kind: WorkKind) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            retry_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn pivot(query: Query) -> Self {
        Self::from_kind(WorkKind::Pivot { query })
    }

    pub fn search_page(query: Query) -> Self {
        Self::from_kind(WorkKind::SearchPage { query })
    }

    pub fn detail(listing: ListingSummary, context: DetailContext) -> Self {
        Self::from_kind(WorkKind::DetailFetch { listing, context })
    }

    /// The same unit with its retry counter bumped.
    pub fn retried(mut self) -> Self {
        self.retry_count += 1;
        self
    }

    /// Number of attempts made once the current one finishes.
    pub fn attempts(&self) -> u32 {
        self.retry_count + 1
    }
}

/// Dead-letter record for a unit that failed permanently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedWorkRecord {
    pub unit: WorkUnit,
    pub last_error: String,
    pub error_kind: FailureKind,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

impl FailedWorkRecord {
    pub fn new(unit: WorkUnit, last_error: impl Into<String>, error_kind: FailureKind) -> Self {
        let attempts = unit.attempts();
        Self {
            unit,
            last_error: last_error.into(),
            error_kind,
            attempts,
            failed_at: Utc::now(),
        }
    }
}
