//! Marketplace endpoint construction.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use crate::types::query::Query;

pub const DEFAULT_BASE_URL: &str = "https://www.airbnb.com/api/v2/";
pub const LISTING_URL_PREFIX: &str = "https://www.airbnb.com/rooms/";
pub const HOST_URL_PREFIX: &str = "https://www.airbnb.com/users/show/";

/// Builds request URLs for search, detail and enrichment calls.
#[derive(Debug, Clone)]
pub struct ApiEndpoints {
    base: Url,
    api_key: String,
    currency: Option<String>,
}

impl ApiEndpoints {
    /// Endpoint paths are appended under `base`, which gains a trailing slash
    /// if it lacks one. Bases like `mailto:` that carry no path are rejected.
    pub fn new(mut base: Url, api_key: impl Into<String>) -> Result<Self, url::ParseError> {
        if base.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            base,
            api_key: api_key.into(),
            currency: None,
        })
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(&format!("{}{}", self.base.path(), path));
        url.query_pairs_mut().append_pair("key", &self.api_key);
        if let Some(currency) = &self.currency {
            url.query_pairs_mut().append_pair("currency", currency);
        }
        url
    }

    /// One page of a price-bounded search.
    pub fn search(&self, query: &Query, page_size: u32) -> Url {
        let mut url = self.endpoint("explore_tabs");
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("_format", "for_explore_search_web")
                .append_pair("query", &query.location)
                .append_pair("price_min", &query.price.min().to_string())
                .append_pair("price_max", &query.price.max().to_string())
                .append_pair("items_offset", &query.offset.to_string())
                .append_pair("items_per_grid", &page_size.to_string())
                .append_pair("locale", &query.locale);
            append_dates(&mut pairs, query.check_in, query.check_out, "checkin", "checkout");
        }
        url
    }

    pub fn detail(&self, listing_id: &str, locale: Option<&str>) -> Url {
        let mut url = self.endpoint(&format!("pdp_listings/{listing_id}"));
        url.query_pairs_mut().append_pair("_format", "for_rooms_v3");
        if let Some(locale) = locale {
            url.query_pairs_mut().append_pair("locale", locale);
        }
        url
    }

    pub fn booking_details(&self, listing_id: &str, check_in: NaiveDate, check_out: NaiveDate) -> Url {
        let mut url = self.endpoint("pdp_listing_booking_details");
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("_format", "for_web_with_date")
                .append_pair("listing_id", listing_id)
                .append_pair("number_of_adults", "1");
            append_dates(&mut pairs, Some(check_in), Some(check_out), "check_in", "check_out");
        }
        url
    }

    pub fn reviews(&self, listing_id: &str, offset: u32, limit: u32) -> Url {
        let mut url = self.endpoint("reviews");
        url.query_pairs_mut()
            .append_pair("_format", "for_mobile_client")
            .append_pair("listing_id", listing_id)
            .append_pair("_offset", &offset.to_string())
            .append_pair("_limit", &limit.to_string());
        url
    }

    pub fn calendar(&self, listing_id: &str, month: u32, year: i32, count: u32) -> Url {
        let mut url = self.endpoint("calendar_months");
        url.query_pairs_mut()
            .append_pair("listing_id", listing_id)
            .append_pair("month", &month.to_string())
            .append_pair("year", &year.to_string())
            .append_pair("count", &count.to_string());
        url
    }

    pub fn host(&self, host_id: &str) -> Url {
        self.endpoint(&format!("users/{host_id}"))
    }
}

fn append_dates(
    pairs: &mut url::form_urlencoded::Serializer<'_, url::UrlQuery<'_>>,
    check_in: Option<NaiveDate>,
    check_out: Option<NaiveDate>,
    in_key: &str,
    out_key: &str,
) {
    if let (Some(check_in), Some(check_out)) = (check_in, check_out) {
        pairs
            .append_pair(in_key, &check_in.format("%Y-%m-%d").to_string())
            .append_pair(out_key, &check_out.format("%Y-%m-%d").to_string());
    }
}

/// Public page of a listing.
pub fn listing_url(listing_id: &str) -> String {
    format!("{LISTING_URL_PREFIX}{listing_id}")
}

/// Extract the listing id from a `/rooms/{id}` URL.
pub fn listing_id_from_url(url: &str) -> Option<String> {
    static ROOM_ID: OnceLock<Regex> = OnceLock::new();
    let pattern = ROOM_ID.get_or_init(|| Regex::new(r"/rooms/(?:plus/)?(\d+)").expect("valid regex"));
    pattern
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Read a `YYYY-MM-DD` query parameter from a start URL.
pub fn date_param(url: &str, name: &str) -> Option<NaiveDate> {
    let parsed = Url::parse(url)
        .or_else(|_| Url::parse(LISTING_URL_PREFIX).and_then(|base| base.join(url)))
        .ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == name)
        .and_then(|(_, value)| NaiveDate::parse_from_str(&value, "%Y-%m-%d").ok())
}
