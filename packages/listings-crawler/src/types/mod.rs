//! Data types for queries, work units, listings and API payloads.

pub mod config;
pub mod listing;
pub mod output;
pub mod query;
pub mod response;
pub mod work;
