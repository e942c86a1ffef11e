//! Listing detail resolution: one detail call, mapping to a [`ListingRecord`],
//! and the optional pricing / reviews / calendar / host enrichment calls.

use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::api::{self, ApiEndpoints, HOST_URL_PREFIX};
use crate::error::{CrawlError, CrawlResult, FetchError};
use crate::traits::{fetcher::Fetcher, sink::RecordSink};
use crate::types::config::DetailOptions;
use crate::types::listing::{CalendarDay, GeoPoint, HostInfo, ListingRecord, ListingSummary};
use crate::types::response::{
    BookingDetailsResponse, CalendarResponse, DetailResponse, HostResponse, ListingDetail,
    PrimaryHost, ReviewsResponse,
};
use crate::types::work::DetailContext;

/// Longest key accepted by the raw-payload store.
pub const MAX_KEY_LENGTH: usize = 256;

const REVIEWS_PAGE_LIMIT: u32 = 50;

#[derive(Debug, Clone, PartialEq)]
pub enum DetailOutcome {
    Listing(Box<ListingRecord>),
    /// Delisted; logged and skipped, never retried.
    Unavailable,
}

pub struct DetailMapper {
    fetcher: Arc<dyn Fetcher>,
    endpoints: ApiEndpoints,
    options: DetailOptions,
}

impl DetailMapper {
    pub fn new(fetcher: Arc<dyn Fetcher>, endpoints: ApiEndpoints, options: DetailOptions) -> Self {
        Self {
            fetcher,
            endpoints,
            options,
        }
    }

    pub fn options(&self) -> &DetailOptions {
        &self.options
    }

    /// Fetch, map and enrich one listing.
    ///
    /// A response with neither a detail object nor the delisted marker is
    /// stored through `sink` for inspection and fails the unit permanently.
    pub async fn resolve(
        &self,
        listing: &ListingSummary,
        context: &DetailContext,
        sink: &dyn RecordSink,
    ) -> CrawlResult<DetailOutcome> {
        let url = self.endpoints.detail(&listing.id, context.locale.as_deref());
        let raw = self.fetcher.fetch_json(&url).await?;

        let response = match DetailResponse::from_json(&raw) {
            Ok(response) => response,
            Err(e) => {
                let key = failure_key(&url);
                sink.store_raw(&key, &raw).await?;
                return Err(CrawlError::MalformedDetail {
                    listing_id: listing.id.clone(),
                    key,
                    reason: e.to_string(),
                });
            }
        };

        if response.is_unavailable() {
            warn!(listing_id = %listing.id, url = %url, "home detail is no longer available");
            return Ok(DetailOutcome::Unavailable);
        }

        let Some(detail) = response.pdp_listing_detail else {
            let key = failure_key(&url);
            sink.store_raw(&key, &raw).await?;
            return Err(CrawlError::UnexpectedDetail {
                listing_id: listing.id.clone(),
                key,
            });
        };

        let listing_id = detail
            .id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| listing.id.clone());
        info!(listing_id = %listing_id, "saving home detail");

        let mut record = self.map_detail(&listing_id, &detail);

        let (reviews, pricing, calendar, primary_host) = futures::join!(
            self.fetch_reviews(&listing_id),
            self.resolve_pricing(&listing_id, listing, context),
            self.fetch_calendar(&listing_id, context),
            self.fetch_host(detail.primary_host.as_ref()),
        );

        record.reviews = reviews?;
        record.pricing = pricing;
        if let Some(calendar) = calendar? {
            record.occupancy_percentage = Some(occupancy_percentage(&calendar));
            record.calendar = Some(calendar);
        }
        record.primary_host = primary_host;

        if !self.options.simple {
            record.full_details = serde_json::to_value(&detail).ok();
        }

        Ok(DetailOutcome::Listing(Box::new(record)))
    }

    /// Project the detail payload onto the compact record.
    pub fn map_detail(&self, listing_id: &str, detail: &ListingDetail) -> ListingRecord {
        let (city, country) = self
            .options
            .location_query
            .as_deref()
            .map(split_location)
            .unwrap_or((None, None));

        ListingRecord {
            url: api::listing_url(listing_id),
            airbnb_id: listing_id.to_string(),
            name: detail.p3_summary_title.clone(),
            stars: detail.star_rating,
            number_of_guests: detail.guest_label.as_deref().and_then(first_number),
            address: detail.location_title.clone(),
            room_type: detail.room_and_property_type.clone(),
            location: GeoPoint {
                lat: detail.lat,
                lng: detail.lng,
            },
            reviews: Vec::new(),
            pricing: Value::Object(Map::new()),
            value_pairs: self.options.value_pairs.clone(),
            photos: detail
                .photos
                .iter()
                .filter_map(|photo| photo.large.clone())
                .collect(),
            amenities: detail
                .listing_amenities
                .iter()
                .filter(|amenity| amenity.is_present)
                .map(|amenity| amenity.id.clone())
                .collect(),
            city,
            country,
            bedrooms: detail
                .bedroom_label
                .as_deref()
                .and_then(|label| label.split_whitespace().next())
                .unwrap_or("0")
                .to_string(),
            month_checked: self.options.check_in.map(|d| d.format("%m").to_string()),
            year_checked: self.options.check_in.map(|d| d.format("%Y").to_string()),
            amenities_details: detail
                .listing_amenities
                .iter()
                .filter_map(|amenity| serde_json::to_value(amenity).ok())
                .collect(),
            description: detail.sectioned_description.clone(),
            calendar: None,
            occupancy_percentage: None,
            primary_host: None,
            full_details: None,
        }
    }

    async fn fetch_reviews(&self, listing_id: &str) -> CrawlResult<Vec<Value>> {
        let max = self.options.max_reviews as usize;
        let mut reviews = Vec::new();
        if !self.options.include_reviews {
            return Ok(reviews);
        }

        while reviews.len() < max {
            let limit = REVIEWS_PAGE_LIMIT.min((max - reviews.len()) as u32);
            let url = self
                .endpoints
                .reviews(listing_id, reviews.len() as u32, limit);
            let page: ReviewsResponse = parse(&url, self.fetcher.fetch_json(&url).await?)?;

            let total = page.metadata.and_then(|m| m.reviews_count);
            let fetched = page.reviews.len();
            reviews.extend(page.reviews);

            if fetched == 0 || total.is_some_and(|total| reviews.len() as u64 >= total) {
                break;
            }
        }

        reviews.truncate(max);
        debug!(listing_id, count = reviews.len(), "fetched reviews");
        Ok(reviews)
    }

    /// Pricing from the search quote when it has a rate, otherwise from the
    /// booking-details call. Failures leave pricing empty.
    async fn resolve_pricing(
        &self,
        listing_id: &str,
        listing: &ListingSummary,
        context: &DetailContext,
    ) -> Value {
        if listing.has_rate() {
            return listing.pricing.clone().unwrap_or(Value::Null);
        }

        let check_in = context.check_in.or(self.options.check_in);
        let check_out = context.check_out.or(self.options.check_out);
        let (Some(check_in), Some(check_out)) = (check_in, check_out) else {
            return Value::Object(Map::new());
        };

        let url = self.endpoints.booking_details(listing_id, check_in, check_out);
        info!(listing_id, %check_in, %check_out, "requesting pricing details");

        let booking = match self.fetcher.fetch_json(&url).await {
            Ok(value) => parse::<BookingDetailsResponse>(&url, value),
            Err(e) => Err(e.into()),
        };

        match booking {
            Ok(response) => match response.pdp_listing_booking_details.into_iter().next() {
                Some(details) if details.available => {
                    let mut pricing = details.price.unwrap_or_default();
                    pricing.insert(
                        "rateType".to_string(),
                        details.rate_type.map(Value::String).unwrap_or(Value::Null),
                    );
                    Value::Object(pricing)
                }
                _ => Value::Object(Map::new()),
            },
            Err(e) => {
                warn!(listing_id, url = %url, error = %e, "error while retrieving pricing details");
                Value::Object(Map::new())
            }
        }
    }

    async fn fetch_calendar(
        &self,
        listing_id: &str,
        context: &DetailContext,
    ) -> CrawlResult<Option<Vec<CalendarDay>>> {
        if self.options.calendar_months == 0 {
            return Ok(None);
        }

        let start = context
            .check_in
            .or(self.options.check_in)
            .unwrap_or_else(|| Utc::now().date_naive());
        let url = self.endpoints.calendar(
            listing_id,
            start.month(),
            start.year(),
            self.options.calendar_months,
        );
        let response: CalendarResponse = parse(&url, self.fetcher.fetch_json(&url).await?)?;

        Ok(Some(
            response
                .calendar_months
                .into_iter()
                .flat_map(|month| month.days)
                .map(|day| CalendarDay {
                    date: day.date,
                    available: day.available,
                    price: day.price,
                })
                .collect(),
        ))
    }

    /// Host listing counts. Failures are logged and leave the host out.
    async fn fetch_host(&self, host: Option<&PrimaryHost>) -> Option<HostInfo> {
        if !self.options.add_more_host_info {
            return None;
        }
        let host_id = host?.id.as_ref()?.to_string();
        let url = self.endpoints.host(&host_id);
        let response = match self.fetcher.fetch_json(&url).await {
            Ok(value) => parse::<HostResponse>(&url, value),
            Err(e) => Err(e.into()),
        };

        match response {
            Ok(HostResponse { user: Some(user) }) => Some(HostInfo {
                id: host_id.clone(),
                host_url: format!("{HOST_URL_PREFIX}{host_id}"),
                listings_count: user.listings_count,
                total_listings_count: user.total_listings_count,
            }),
            Ok(HostResponse { user: None }) => None,
            Err(e) => {
                warn!(host_id = %host_id, error = %e, "error while retrieving host info");
                None
            }
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(url: &Url, value: Value) -> CrawlResult<T> {
    serde_json::from_value(value)
        .map_err(|e| FetchError::malformed(url.as_str(), e.to_string()).into())
}

/// Key under which an unexpected payload is kept: host and path, with `/`
/// replaced since it is not allowed in key names.
pub fn failure_key(url: &Url) -> String {
    let raw: String = format!("{}{}", url.host_str().unwrap_or_default(), url.path())
        .chars()
        .take(MAX_KEY_LENGTH)
        .collect();
    format!("failed_{}", raw.replace('/', "-"))
}

/// "Paris, France" -> (Some("paris"), Some("france")); inner whitespace becomes `-`.
pub fn split_location(query: &str) -> (Option<String>, Option<String>) {
    let lowered = query.to_lowercase();
    let mut parts = lowered.split(',').map(|part| {
        part.split_whitespace().collect::<Vec<_>>().join("-")
    });
    let city = parts.next().filter(|p| !p.is_empty());
    let country = parts.next().filter(|p| !p.is_empty());
    (city, country)
}

fn first_number(label: &str) -> Option<u32> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let pattern = DIGITS.get_or_init(|| Regex::new(r"\d+").expect("valid regex"));
    pattern.find(label).and_then(|m| m.as_str().parse().ok())
}

/// Share of calendar days that are booked, rounded to a whole percent.
pub fn occupancy_percentage(calendar: &[CalendarDay]) -> u32 {
    if calendar.is_empty() {
        return 0;
    }
    let booked = calendar.iter().filter(|day| !day.available).count();
    ((booked as f64 / calendar.len() as f64) * 100.0).round() as u32
}

/// Stay dates carried by a start URL (`check_in` / `check_out` parameters).
pub fn dates_from_start_url(url: &str) -> (Option<NaiveDate>, Option<NaiveDate>) {
    (api::date_param(url, "check_in"), api::date_param(url, "check_out"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::MemorySink;
    use crate::testing::MockFetcher;
    use crate::types::response::UNAVAILABLE_MESSAGE;
    use serde_json::json;

    fn endpoints() -> ApiEndpoints {
        ApiEndpoints::new(Url::parse("https://api.test/v2/").unwrap(), "k").unwrap()
    }

    fn detail_json(id: u64) -> Value {
        json!({"pdp_listing_detail": {
            "id": id,
            "p3_summary_title": "Sunny loft",
            "star_rating": 4.5,
            "guest_label": "4 guests",
            "location_title": "Berlin, Germany",
            "lat": 52.5,
            "lng": 13.4,
            "room_and_property_type": "Entire loft",
            "bedroom_label": "2 bedrooms",
            "photos": [{"large": "https://img/1.jpg"}, {"small": "x"}],
            "listing_amenities": [
                {"id": 1, "is_present": true, "name": "Wifi"},
                {"id": 2, "is_present": false, "name": "Pool"}
            ],
            "primary_host": {"id": 77}
        }})
    }

    fn mapper(fetcher: MockFetcher, options: DetailOptions) -> DetailMapper {
        DetailMapper::new(Arc::new(fetcher), endpoints(), options)
    }

    fn no_enrichment() -> DetailOptions {
        DetailOptions {
            include_reviews: false,
            location_query: Some("Berlin, Germany".into()),
            check_in: NaiveDate::from_ymd_opt(2024, 7, 1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_maps_detail_fields() {
        let fetcher = MockFetcher::new().on_path("/v2/pdp_listings/5", detail_json(5));
        let sink = MemorySink::new();
        let outcome = mapper(fetcher, no_enrichment())
            .resolve(&ListingSummary::new("5"), &DetailContext::default(), &sink)
            .await
            .unwrap();

        let DetailOutcome::Listing(record) = outcome else {
            panic!("expected listing");
        };
        assert_eq!(record.airbnb_id, "5");
        assert_eq!(record.url, "https://www.airbnb.com/rooms/5");
        assert_eq!(record.number_of_guests, Some(4));
        assert_eq!(record.bedrooms, "2");
        assert_eq!(record.photos, vec!["https://img/1.jpg".to_string()]);
        assert_eq!(record.amenities, vec![json!(1)]);
        assert_eq!(record.amenities_details.len(), 2);
        assert_eq!(record.city.as_deref(), Some("berlin"));
        assert_eq!(record.country.as_deref(), Some("germany"));
        assert_eq!(record.month_checked.as_deref(), Some("07"));
        assert_eq!(record.year_checked.as_deref(), Some("2024"));
        assert!(record.full_details.is_none());
    }

    #[tokio::test]
    async fn test_unavailable_is_skipped_without_raw_payload() {
        let fetcher = MockFetcher::new()
            .on_path("/v2/pdp_listings/9", json!({"error_message": UNAVAILABLE_MESSAGE}));
        let sink = MemorySink::new();
        let outcome = mapper(fetcher, no_enrichment())
            .resolve(&ListingSummary::new("9"), &DetailContext::default(), &sink)
            .await
            .unwrap();
        assert_eq!(outcome, DetailOutcome::Unavailable);
        assert!(sink.raw_keys().is_empty());
    }

    #[tokio::test]
    async fn test_unexpected_shape_stores_raw_and_fails_permanently() {
        let fetcher =
            MockFetcher::new().on_path("/v2/pdp_listings/3", json!({"error_message": "Oops"}));
        let sink = MemorySink::new();
        let err = mapper(fetcher, no_enrichment())
            .resolve(&ListingSummary::new("3"), &DetailContext::default(), &sink)
            .await
            .unwrap_err();

        assert!(!err.kind().should_retry());
        assert_eq!(sink.raw_keys(), vec!["failed_api.test-v2-pdp_listings-3".to_string()]);
    }

    #[tokio::test]
    async fn test_null_and_mistyped_fields_still_map() {
        let fetcher = MockFetcher::new().on_path(
            "/v2/pdp_listings/5",
            json!({"pdp_listing_detail": {
                "id": 5,
                "photos": null,
                "listing_amenities": null,
                "star_rating": "4.9",
                "primary_host": {"id": null}
            }}),
        );
        let sink = MemorySink::new();
        let options = DetailOptions {
            add_more_host_info: true,
            ..no_enrichment()
        };
        let outcome = mapper(fetcher, options)
            .resolve(&ListingSummary::new("5"), &DetailContext::default(), &sink)
            .await
            .unwrap();

        let DetailOutcome::Listing(record) = outcome else {
            panic!("expected listing");
        };
        assert_eq!(record.airbnb_id, "5");
        assert_eq!(record.stars, Some(4.9));
        assert!(record.photos.is_empty());
        assert!(record.amenities.is_empty());
        assert!(record.primary_host.is_none());
        assert!(sink.raw_keys().is_empty());
    }

    #[tokio::test]
    async fn test_non_object_detail_is_malformed() {
        let fetcher =
            MockFetcher::new().on_path("/v2/pdp_listings/4", json!({"pdp_listing_detail": "oops"}));
        let sink = MemorySink::new();
        let err = mapper(fetcher, no_enrichment())
            .resolve(&ListingSummary::new("4"), &DetailContext::default(), &sink)
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlError::MalformedDetail { .. }));
        assert!(!err.kind().should_retry());
        assert_eq!(sink.raw_keys(), vec!["failed_api.test-v2-pdp_listings-4".to_string()]);
    }

    #[tokio::test]
    async fn test_search_quote_with_rate_skips_booking_call() {
        let fetcher = MockFetcher::new().on_path("/v2/pdp_listings/5", detail_json(5));
        let calls = fetcher.calls_handle();
        let listing = ListingSummary::new("5").with_pricing(json!({"rate": {"amount": 99}}));
        let context = DetailContext {
            check_in: NaiveDate::from_ymd_opt(2024, 7, 1),
            check_out: NaiveDate::from_ymd_opt(2024, 7, 3),
            ..Default::default()
        };

        let outcome = mapper(fetcher, no_enrichment())
            .resolve(&listing, &context, &MemorySink::new())
            .await
            .unwrap();

        let DetailOutcome::Listing(record) = outcome else {
            panic!("expected listing");
        };
        assert_eq!(record.pricing["rate"]["amount"], 99);
        assert_eq!(calls.read().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_booking_pricing_and_host_enrichment() {
        let fetcher = MockFetcher::new()
            .on_path("/v2/pdp_listings/5", detail_json(5))
            .on_path(
                "/v2/pdp_listing_booking_details",
                json!({"pdp_listing_booking_details": [{
                    "available": true,
                    "rate_type": "nightly",
                    "price": {"total": {"amount": 300}}
                }]}),
            )
            .on_path(
                "/v2/users/77",
                json!({"user": {"listings_count": 3, "total_listings_count": 5}}),
            );
        let options = DetailOptions {
            add_more_host_info: true,
            simple: false,
            check_out: NaiveDate::from_ymd_opt(2024, 7, 4),
            ..no_enrichment()
        };

        let outcome = mapper(fetcher, options)
            .resolve(&ListingSummary::new("5"), &DetailContext::default(), &MemorySink::new())
            .await
            .unwrap();

        let DetailOutcome::Listing(record) = outcome else {
            panic!("expected listing");
        };
        assert_eq!(record.pricing["rateType"], "nightly");
        assert_eq!(record.pricing["total"]["amount"], 300);
        let host = record.primary_host.unwrap();
        assert_eq!(host.listings_count, Some(3));
        assert_eq!(host.host_url, "https://www.airbnb.com/users/show/77");
        assert!(record.full_details.is_some());
    }

    #[tokio::test]
    async fn test_pricing_failure_is_not_fatal() {
        let fetcher = MockFetcher::new()
            .on_path("/v2/pdp_listings/5", detail_json(5))
            .fail_path("/v2/pdp_listing_booking_details", 503);
        let options = DetailOptions {
            check_out: NaiveDate::from_ymd_opt(2024, 7, 4),
            ..no_enrichment()
        };

        let outcome = mapper(fetcher, options)
            .resolve(&ListingSummary::new("5"), &DetailContext::default(), &MemorySink::new())
            .await
            .unwrap();
        let DetailOutcome::Listing(record) = outcome else {
            panic!("expected listing");
        };
        assert_eq!(record.pricing, json!({}));
    }

    #[tokio::test]
    async fn test_reviews_and_calendar() {
        let fetcher = MockFetcher::new()
            .on_path("/v2/pdp_listings/5", detail_json(5))
            .on_path(
                "/v2/reviews",
                json!({"reviews": [{"id": 1}, {"id": 2}], "metadata": {"reviews_count": 2}}),
            )
            .on_path(
                "/v2/calendar_months",
                json!({"calendar_months": [
                    {"days": [
                        {"date": "2024-07-01", "available": false},
                        {"date": "2024-07-02", "available": true},
                        {"date": "2024-07-03", "available": false},
                        {"date": "2024-07-04", "available": true}
                    ]}
                ]}),
            );
        let options = DetailOptions {
            include_reviews: true,
            calendar_months: 1,
            ..no_enrichment()
        };

        let outcome = mapper(fetcher, options)
            .resolve(&ListingSummary::new("5"), &DetailContext::default(), &MemorySink::new())
            .await
            .unwrap();
        let DetailOutcome::Listing(record) = outcome else {
            panic!("expected listing");
        };
        assert_eq!(record.reviews.len(), 2);
        assert_eq!(record.calendar.as_ref().map(Vec::len), Some(4));
        assert_eq!(record.occupancy_percentage, Some(50));
    }

    #[test]
    fn test_split_location() {
        assert_eq!(
            split_location("New York, United States"),
            (Some("new-york".into()), Some("united-states".into()))
        );
        assert_eq!(split_location("Tokyo"), (Some("tokyo".into()), None));
    }

    #[test]
    fn test_failure_key_is_truncated() {
        let long_path = "a/".repeat(300);
        let url = Url::parse(&format!("https://api.test/{long_path}")).unwrap();
        let key = failure_key(&url);
        assert!(key.len() <= MAX_KEY_LENGTH + "failed_".len());
        assert!(!key.contains('/'));
    }

    #[test]
    fn test_occupancy_of_empty_calendar() {
        assert_eq!(occupancy_percentage(&[]), 0);
    }

    #[test]
    fn test_dates_from_start_url() {
        let (check_in, check_out) =
            dates_from_start_url("https://www.airbnb.com/rooms/1?check_in=2024-03-01&check_out=2024-03-05");
        assert_eq!(check_in, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(check_out, NaiveDate::from_ymd_opt(2024, 3, 5));
    }
}
