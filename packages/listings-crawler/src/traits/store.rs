//! Run-state persistence trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::pipeline::budget::BudgetSnapshot;
use crate::types::work::WorkUnit;

/// Everything needed to resume an interrupted enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub budget: BudgetSnapshot,
    pub pending: Vec<WorkUnit>,
    #[serde(default)]
    pub seen_listings: Vec<String>,
    #[serde(default)]
    pub failed_units: u64,
    pub saved_at: DateTime<Utc>,
}

impl RunState {
    /// A run with nothing left to do.
    pub fn is_finished(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Durable home of [`RunState`].
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> StoreResult<Option<RunState>>;

    async fn save(&self, state: &RunState) -> StoreResult<()>;
}
