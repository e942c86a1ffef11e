//! JSON file persistence of run state.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::StoreResult;
use crate::traits::store::{RunState, StateStore};

/// Stores run state as a single JSON document.
///
/// Saves go to a sibling temp file which is then renamed over the target, so
/// a crash mid-write leaves the previous state intact.
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete any saved state.
    pub async fn clear(&self) -> StoreResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> StoreResult<Option<RunState>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    async fn save(&self, state: &RunState) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, serde_json::to_vec_pretty(state)?).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(path = %self.path.display(), pending = state.pending.len(), "run state saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::budget::BudgetSnapshot;
    use crate::types::listing::ListingSummary;
    use crate::types::work::{DetailContext, WorkUnit};
    use chrono::Utc;

    fn state() -> RunState {
        RunState {
            budget: BudgetSnapshot {
                max_allowed: Some(50),
                emitted_count: 7,
                aborted: false,
            },
            pending: vec![WorkUnit::detail(ListingSummary::new("11"), DetailContext::default())],
            seen_listings: vec!["11".into()],
            failed_units: 1,
            saved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("state.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("nested/state.json"));
        let saved = state();
        store.save(&saved).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(saved));
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("state.json"));
        store.save(&state()).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(FileStateStore::new(path).load().await.is_err());
    }
}
