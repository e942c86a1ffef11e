use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use url::Url;

use crate::api::DEFAULT_BASE_URL;

/// Environment configuration for the crawler binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base_url: Url,
    /// Shared request quota across all workers.
    pub requests_per_second: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            api_key: env::var("AIRBNB_API_KEY").context("AIRBNB_API_KEY must be set")?,
            api_base_url: env::var("AIRBNB_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
                .parse()
                .context("AIRBNB_API_BASE_URL must be a valid URL")?,
            requests_per_second: env::var("REQUESTS_PER_SECOND")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("REQUESTS_PER_SECOND must be a valid number")?,
        })
    }
}
