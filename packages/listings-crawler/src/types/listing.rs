//! Listing identity and the emitted listing record.

use serde::{Deserialize, Serialize};

/// Minimal identity of a listing seen on a search page.
///
/// `pricing` carries the search result's pricing quote, forwarded so the
/// detail stage can skip the booking-details call when a rate is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSummary {
    pub id: String,
    #[serde(default)]
    pub pricing: Option<serde_json::Value>,
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl ListingSummary {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pricing: None,
            raw: serde_json::Value::Null,
        }
    }

    pub fn with_pricing(mut self, pricing: serde_json::Value) -> Self {
        self.pricing = Some(pricing);
        self
    }

    /// Whether the forwarded pricing quote already carries a rate.
    pub fn has_rate(&self) -> bool {
        self.pricing
            .as_ref()
            .and_then(|p| p.get("rate"))
            .is_some_and(|rate| !rate.is_null())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// One day of a listing's availability calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub date: String,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInfo {
    pub id: String,
    pub host_url: String,
    pub listings_count: Option<u64>,
    pub total_listings_count: Option<u64>,
}

/// A fully mapped listing, ready for the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingRecord {
    pub url: String,
    pub airbnb_id: String,
    pub name: Option<String>,
    pub stars: Option<f64>,
    pub number_of_guests: Option<u32>,
    pub address: Option<String>,
    pub room_type: Option<String>,
    pub location: GeoPoint,
    pub reviews: Vec<serde_json::Value>,
    pub pricing: serde_json::Value,
    pub value_pairs: Option<serde_json::Value>,
    pub photos: Vec<String>,
    pub amenities: Vec<serde_json::Value>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub bedrooms: String,
    pub month_checked: Option<String>,
    pub year_checked: Option<String>,
    pub amenities_details: Vec<serde_json::Value>,
    pub description: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar: Option<Vec<CalendarDay>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupancy_percentage: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_host: Option<HostInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_has_rate() {
        assert!(!ListingSummary::new("1").has_rate());
        assert!(!ListingSummary::new("1")
            .with_pricing(json!({"rate": null}))
            .has_rate());
        assert!(ListingSummary::new("1")
            .with_pricing(json!({"rate": {"amount": 120}}))
            .has_rate());
    }
}
