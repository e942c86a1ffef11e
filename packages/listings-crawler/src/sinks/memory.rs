//! In-memory sink for testing.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use crate::error::{SinkError, SinkResult};
use crate::traits::sink::RecordSink;
use crate::types::listing::ListingRecord;
use crate::types::output::OutputRecord;
use crate::types::work::FailedWorkRecord;

/// Keeps every pushed record and raw payload in memory.
#[derive(Default)]
pub struct MemorySink {
    records: RwLock<Vec<OutputRecord>>,
    raw: RwLock<BTreeMap<String, Value>>,
    failing_pushes: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` pushes with an I/O error.
    pub fn with_failing_pushes(self, count: usize) -> Self {
        self.failing_pushes.store(count, Ordering::SeqCst);
        self
    }

    /// All records in push order.
    pub fn records(&self) -> Vec<OutputRecord> {
        self.records.read().unwrap().clone()
    }

    pub fn listings(&self) -> Vec<ListingRecord> {
        self.records
            .read()
            .unwrap()
            .iter()
            .filter_map(|record| record.as_listing().cloned())
            .collect()
    }

    pub fn failed(&self) -> Vec<FailedWorkRecord> {
        self.records
            .read()
            .unwrap()
            .iter()
            .filter_map(|record| record.as_failed().cloned())
            .collect()
    }

    /// Keys of stored raw payloads, sorted.
    pub fn raw_keys(&self) -> Vec<String> {
        self.raw.read().unwrap().keys().cloned().collect()
    }

    pub fn raw(&self, key: &str) -> Option<Value> {
        self.raw.read().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn push(&self, record: &OutputRecord) -> SinkResult<()> {
        let rejected = self
            .failing_pushes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(SinkError::Io(std::io::Error::other("push rejected")));
        }
        self.records.write().unwrap().push(record.clone());
        Ok(())
    }

    async fn store_raw(&self, key: &str, value: &Value) -> SinkResult<()> {
        self.raw
            .write()
            .unwrap()
            .insert(key.to_string(), value.clone());
        Ok(())
    }
}
