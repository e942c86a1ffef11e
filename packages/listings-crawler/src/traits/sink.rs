//! Output sink trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SinkResult;
use crate::types::output::OutputRecord;

/// Append-only destination for listing and diagnostic records, plus a
/// key-value area for raw payloads kept for inspection.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn push(&self, record: &OutputRecord) -> SinkResult<()>;

    async fn store_raw(&self, key: &str, value: &Value) -> SinkResult<()>;
}
