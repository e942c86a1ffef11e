//! Dataset written as JSON lines, plus a directory of raw payloads.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::SinkResult;
use crate::traits::sink::RecordSink;
use crate::types::output::OutputRecord;

pub const DATASET_FILE: &str = "dataset.jsonl";
pub const KEY_VALUE_DIR: &str = "key_value_store";

/// Appends one JSON document per line to `{dir}/dataset.jsonl` and stores raw
/// payloads as `{dir}/key_value_store/{key}.json`.
pub struct JsonlSink {
    dir: PathBuf,
    dataset: Mutex<File>,
}

impl JsonlSink {
    /// Open (or create) the output directory. Existing records are kept.
    pub async fn open(dir: impl Into<PathBuf>) -> SinkResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(dir.join(KEY_VALUE_DIR)).await?;
        let dataset = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(DATASET_FILE))
            .await?;
        Ok(Self {
            dir,
            dataset: Mutex::new(dataset),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl RecordSink for JsonlSink {
    async fn push(&self, record: &OutputRecord) -> SinkResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut dataset = self.dataset.lock().await;
        dataset.write_all(&line).await?;
        dataset.flush().await?;
        Ok(())
    }

    async fn store_raw(&self, key: &str, value: &Value) -> SinkResult<()> {
        let path = self.dir.join(KEY_VALUE_DIR).join(format!("{key}.json"));
        tokio::fs::write(path, serde_json::to_vec_pretty(value)?).await?;
        Ok(())
    }
}
