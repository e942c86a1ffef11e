//! In-memory run state, for tests and one-shot runs.

use async_trait::async_trait;
use std::sync::RwLock;

use crate::error::StoreResult;
use crate::traits::store::{RunState, StateStore};

#[derive(Default)]
pub struct MemoryStateStore {
    state: RwLock<Option<RunState>>,
    saves: RwLock<usize>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing state, as if loaded after a restart.
    pub fn with_state(state: RunState) -> Self {
        Self {
            state: RwLock::new(Some(state)),
            saves: RwLock::new(0),
        }
    }

    /// Latest saved state.
    pub fn current(&self) -> Option<RunState> {
        self.state.read().unwrap().clone()
    }

    /// Number of saves performed.
    pub fn save_count(&self) -> usize {
        *self.saves.read().unwrap()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> StoreResult<Option<RunState>> {
        Ok(self.current())
    }

    async fn save(&self, state: &RunState) -> StoreResult<()> {
        *self.state.write().unwrap() = Some(state.clone());
        *self.saves.write().unwrap() += 1;
        Ok(())
    }
}
