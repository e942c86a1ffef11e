//! Search query descriptor and price ranges.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive price range in whole currency units.
///
/// Invariant: `min <= max`. Construct through [`PriceRange::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceRange {
    min: u32,
    max: u32,
}

impl PriceRange {
    /// Create a range, returning `None` when `min > max`.
    pub fn new(min: u32, max: u32) -> Option<Self> {
        (min <= max).then_some(Self { min, max })
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Number of distinct prices above `min` covered by the range.
    pub fn width(&self) -> u32 {
        self.max - self.min
    }

    /// Whether `price` falls inside the range.
    pub fn contains(&self, price: u32) -> bool {
        self.min <= price && price <= self.max
    }

    /// Split into `[min, mid]` and `[mid + 1, max]` with `mid = floor((min + max) / 2)`.
    ///
    /// Returns `None` when the width is below `min_width` (clamped to 1, since a
    /// single-price range has nothing to split).
    pub fn bisect(&self, min_width: u32) -> Option<(PriceRange, PriceRange)> {
        if self.width() < min_width.max(1) {
            return None;
        }
        let mid = self.min + self.width() / 2;
        Some((
            PriceRange {
                min: self.min,
                max: mid,
            },
            PriceRange {
                min: mid + 1,
                max: self.max,
            },
        ))
    }
}

impl fmt::Display for PriceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// A price-bounded search query at a page offset.
///
/// Immutable once enqueued: pagination and splitting derive new values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub location: String,
    pub price: PriceRange,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub locale: String,
    #[serde(default)]
    pub offset: u32,
}

impl Query {
    /// Create a query at offset 0.
    pub fn new(location: impl Into<String>, price: PriceRange, locale: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            price,
            check_in: None,
            check_out: None,
            locale: locale.into(),
            offset: 0,
        }
    }

    /// Set the stay dates.
    pub fn with_dates(mut self, check_in: NaiveDate, check_out: NaiveDate) -> Self {
        self.check_in = Some(check_in);
        self.check_out = Some(check_out);
        self
    }

    /// Same query at a different offset.
    pub fn at_offset(&self, offset: u32) -> Self {
        Self {
            offset,
            ..self.clone()
        }
    }

    /// Same query restricted to another price range, starting over at offset 0.
    pub fn with_price(&self, price: PriceRange) -> Self {
        Self {
            price,
            offset: 0,
            ..self.clone()
        }
    }

    /// 1-based index of the page this query fetches.
    pub fn page_depth(&self, page_size: u32) -> u32 {
        self.offset / page_size.max(1) + 1
    }
}
