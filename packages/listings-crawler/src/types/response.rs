//! Typed response schemas for the marketplace API.
//!
//! Every field the crawler reads is declared here with an explicit default,
//! so a missing field shows up as `None` / empty rather than a runtime surprise.
//! Unread fields are kept in `extra` where the full payload is re-emitted.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::listing::ListingSummary;
use crate::error::{FetchError, FetchResult};

/// Error message the API returns for delisted homes.
pub const UNAVAILABLE_MESSAGE: &str = "Unfortunately, this is no longer available.";

// ============================================================================
// Lenient field decoding
// ============================================================================

/// `None` for null, absent or mistyped values.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Numbers, or strings holding a number.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// The type's default for null or mistyped values.
fn lenient_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Array elements that decode; null or non-array values give an empty list.
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

// ============================================================================
// Search
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub explore_tabs: Vec<ExploreTab>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExploreTab {
    #[serde(default)]
    pub home_tab_metadata: Option<HomeTabMetadata>,
    #[serde(default)]
    pub pagination_metadata: Option<PaginationMetadata>,
    #[serde(default)]
    pub sections: Vec<ExploreSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HomeTabMetadata {
    #[serde(default)]
    pub listings_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginationMetadata {
    #[serde(default)]
    pub has_next_page: Option<bool>,
    #[serde(default)]
    pub items_offset: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExploreSection {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub listings: Vec<SearchListing>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchListing {
    #[serde(default, deserialize_with = "lenient")]
    pub listing: Option<SearchListingCore>,
    #[serde(default)]
    pub pricing_quote: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchListingCore {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<IdField>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One executed search page, as consumed by the partitioner.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub listings: Vec<ListingSummary>,
    pub total_count: u64,
    pub has_more_pages: bool,
}

impl SearchPage {
    /// Interpret a raw search payload fetched at `offset`.
    ///
    /// A payload without a total count is malformed (and therefore transient).
    /// When the API omits `has_next_page`, it is derived from the offset, the
    /// page length and the reachable total (`min(total, cap)`).
    pub fn from_json(url: &str, value: Value, offset: u32, cap: u32) -> FetchResult<Self> {
        let response: SearchResponse = serde_json::from_value(value)
            .map_err(|e| FetchError::malformed(url, format!("search payload: {e}")))?;

        let tab = response
            .explore_tabs
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::malformed(url, "search payload has no explore tab"))?;

        let total_count = tab
            .home_tab_metadata
            .and_then(|m| m.listings_count)
            .ok_or_else(|| FetchError::malformed(url, "search payload has no listings count"))?;

        let mut skipped = 0usize;
        let listings: Vec<ListingSummary> = tab
            .sections
            .into_iter()
            .flat_map(|section| section.listings)
            .filter_map(|item| {
                let core = item.listing?;
                let Some(id) = core.id else {
                    skipped += 1;
                    return None;
                };
                Some(ListingSummary {
                    id: id.to_string(),
                    pricing: item.pricing_quote,
                    raw: Value::Object(core.extra),
                })
            })
            .collect();
        if skipped > 0 {
            warn!(url, skipped, "search results without a listing id");
        }

        let reachable = total_count.min(u64::from(cap));
        let derived_more = u64::from(offset) + (listings.len() as u64) < reachable;
        let has_more_pages = tab
            .pagination_metadata
            .and_then(|p| p.has_next_page)
            .unwrap_or(derived_more)
            && !listings.is_empty();

        Ok(Self {
            listings,
            total_count,
            has_more_pages,
        })
    }
}

// ============================================================================
// Detail
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailResponse {
    #[serde(default)]
    pub pdp_listing_detail: Option<ListingDetail>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl DetailResponse {
    /// Decode the detail envelope.
    ///
    /// A null or absent `pdp_listing_detail` is `None`. Fields inside the
    /// detail object decode leniently, so this only fails when the detail is
    /// present but not an object.
    pub fn from_json(value: &Value) -> Result<Self, serde_json::Error> {
        let pdp_listing_detail = match value.get("pdp_listing_detail") {
            None | Some(Value::Null) => None,
            Some(detail) => Some(ListingDetail::deserialize(detail)?),
        };
        let error_message = value
            .get("error_message")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            pdp_listing_detail,
            error_message,
        })
    }

    /// No detail object and the API's delisted marker.
    pub fn is_unavailable(&self) -> bool {
        self.pdp_listing_detail.is_none()
            && self.error_message.as_deref() == Some(UNAVAILABLE_MESSAGE)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingDetail {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<IdField>,
    #[serde(default, deserialize_with = "lenient")]
    pub p3_summary_title: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub star_rating: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub guest_label: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub location_title: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub lng: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub room_and_property_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub photos: Vec<Photo>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub listing_amenities: Vec<Amenity>,
    #[serde(default, deserialize_with = "lenient")]
    pub bedroom_label: Option<String>,
    #[serde(default)]
    pub sectioned_description: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub primary_host: Option<PrimaryHost>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Listing and host ids arrive as numbers in some payloads and strings in others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdField {
    Number(u64),
    Text(String),
}

impl std::fmt::Display for IdField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdField::Number(n) => write!(f, "{n}"),
            IdField::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Photo {
    #[serde(default, deserialize_with = "lenient")]
    pub large: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Amenity {
    #[serde(default)]
    pub id: Value,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub is_present: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryHost {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<IdField>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Enrichment
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingDetailsResponse {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub pdp_listing_booking_details: Vec<BookingDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingDetails {
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub available: bool,
    #[serde(default)]
    pub rate_type: Option<String>,
    #[serde(default)]
    pub price: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewsResponse {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub reviews: Vec<Value>,
    #[serde(default)]
    pub metadata: Option<ReviewsMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewsMetadata {
    #[serde(default)]
    pub reviews_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalendarResponse {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub calendar_months: Vec<CalendarMonth>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalendarMonth {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub days: Vec<CalendarDayPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalendarDayPayload {
    pub date: String,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub available: bool,
    #[serde(default)]
    pub price: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostResponse {
    #[serde(default)]
    pub user: Option<HostUser>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostUser {
    #[serde(default)]
    pub listings_count: Option<u64>,
    #[serde(default)]
    pub total_listings_count: Option<u64>,
}
