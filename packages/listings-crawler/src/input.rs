//! Crawl input document: parsing, validation and translation into the
//! enumeration config, detail options and seed work.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use url::Url;

use crate::api;
use crate::error::InputError;
use crate::pipeline::detail::dates_from_start_url;
use crate::types::config::{DetailOptions, EnumerationConfig};
use crate::types::listing::ListingSummary;
use crate::types::query::{PriceRange, Query};
use crate::types::work::{DetailContext, WorkUnit};

/// A start URL, given either as a bare string or as `{"url": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StartUrl {
    Plain(String),
    Request { url: String },
}

impl StartUrl {
    pub fn url(&self) -> &str {
        match self {
            StartUrl::Plain(url) | StartUrl::Request { url } => url,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyConfiguration {
    pub proxy_urls: Vec<String>,
}

/// The input document, with camelCase keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrawlInput {
    /// "City, Country" search string.
    pub location_query: Option<String>,

    /// Default: 0.
    pub min_price: u32,

    /// Default: 1,000,000.
    pub max_price: u32,

    /// `YYYY-MM-DD`; must be given together with `check_out`.
    pub check_in: Option<String>,
    pub check_out: Option<String>,

    pub currency: Option<String>,

    /// Default: "en-US".
    pub locale: String,

    /// When non-empty the search is skipped and these listings are resolved directly.
    pub start_urls: Vec<StartUrl>,

    /// Default: 20.
    pub max_concurrency: usize,

    /// Zero or absent means unlimited.
    pub max_listings: Option<u64>,

    pub include_reviews: bool,
    pub max_reviews: u32,
    pub calendar_months: u32,
    pub add_more_host_info: bool,
    pub simple: bool,
    pub debug_log: bool,
    pub value_pairs: Option<Value>,
    pub proxy_configuration: Option<ProxyConfiguration>,
}

impl Default for CrawlInput {
    fn default() -> Self {
        let details = DetailOptions::default();
        Self {
            location_query: None,
            min_price: 0,
            max_price: 1_000_000,
            check_in: None,
            check_out: None,
            currency: None,
            locale: "en-US".to_string(),
            start_urls: Vec::new(),
            max_concurrency: EnumerationConfig::default().worker_count,
            max_listings: None,
            include_reviews: details.include_reviews,
            max_reviews: details.max_reviews,
            calendar_months: details.calendar_months,
            add_more_host_info: details.add_more_host_info,
            simple: details.simple,
            debug_log: false,
            value_pairs: None,
            proxy_configuration: None,
        }
    }
}

impl CrawlInput {
    /// Check every startup precondition.
    pub fn validate(&self) -> Result<(), InputError> {
        let has_location = self
            .location_query
            .as_deref()
            .is_some_and(|q| !q.trim().is_empty());
        if !has_location && self.start_urls.is_empty() {
            return Err(InputError::MissingLocation);
        }

        self.price_range()?;
        self.dates()?;

        if self.max_concurrency == 0 {
            return Err(InputError::ZeroConcurrency);
        }

        self.proxy_urls()?;
        Ok(())
    }

    pub fn price_range(&self) -> Result<PriceRange, InputError> {
        PriceRange::new(self.min_price, self.max_price).ok_or(InputError::InvertedPriceRange {
            min: self.min_price,
            max: self.max_price,
        })
    }

    /// Parsed stay dates; both or neither.
    pub fn dates(&self) -> Result<Option<(NaiveDate, NaiveDate)>, InputError> {
        let check_in = parse_date("checkIn", self.check_in.as_deref())?;
        let check_out = parse_date("checkOut", self.check_out.as_deref())?;

        match (check_in, check_out) {
            (None, None) => Ok(None),
            (Some(check_in), Some(check_out)) if check_out > check_in => {
                Ok(Some((check_in, check_out)))
            }
            (Some(check_in), Some(check_out)) => Err(InputError::InvertedDates {
                check_in: check_in.to_string(),
                check_out: check_out.to_string(),
            }),
            _ => Err(InputError::UnpairedDates),
        }
    }

    pub fn proxy_urls(&self) -> Result<Vec<Url>, InputError> {
        self.proxy_configuration
            .iter()
            .flat_map(|config| config.proxy_urls.iter())
            .map(|raw| Url::parse(raw).map_err(|_| InputError::InvalidProxy(raw.clone())))
            .collect()
    }

    pub fn to_enumeration_config(&self) -> EnumerationConfig {
        let config = EnumerationConfig::default().with_workers(self.max_concurrency);
        match self.max_listings {
            Some(max) if max > 0 => config.with_max_listings(max),
            _ => config,
        }
    }

    pub fn to_detail_options(&self) -> Result<DetailOptions, InputError> {
        let dates = self.dates()?;
        Ok(DetailOptions {
            simple: self.simple,
            include_reviews: self.include_reviews,
            max_reviews: self.max_reviews,
            calendar_months: self.calendar_months,
            add_more_host_info: self.add_more_host_info,
            location_query: self.location_query.clone(),
            check_in: dates.map(|(check_in, _)| check_in),
            check_out: dates.map(|(_, check_out)| check_out),
            value_pairs: self.value_pairs.clone(),
        })
    }

    /// Initial work: one detail unit per usable start URL, otherwise a single
    /// pivot over the whole price range.
    pub fn seed_units(&self) -> Result<Vec<WorkUnit>, InputError> {
        if !self.start_urls.is_empty() {
            return Ok(self
                .start_urls
                .iter()
                .filter_map(|start| self.start_url_unit(start.url()))
                .collect());
        }

        let location = self
            .location_query
            .clone()
            .ok_or(InputError::MissingLocation)?;
        let mut query = Query::new(location, self.price_range()?, self.locale.clone());
        if let Some((check_in, check_out)) = self.dates()? {
            query = query.with_dates(check_in, check_out);
        }
        Ok(vec![WorkUnit::pivot(query)])
    }

    fn start_url_unit(&self, url: &str) -> Option<WorkUnit> {
        let Some(id) = api::listing_id_from_url(url) else {
            warn!(url, "start URL is not a listing page, skipping");
            return None;
        };
        let (check_in, check_out) = dates_from_start_url(url);
        let context = DetailContext {
            check_in,
            check_out,
            locale: Some(self.locale.clone()),
            origin_range: None,
        };
        Some(WorkUnit::detail(ListingSummary::new(id), context))
    }
}

fn parse_date(field: &'static str, value: Option<&str>) -> Result<Option<NaiveDate>, InputError> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| {
            NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").map_err(|_| InputError::InvalidDate {
                field,
                value: v.to_string(),
            })
        })
        .transpose()
}
