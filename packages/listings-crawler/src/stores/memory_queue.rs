//! In-process work queue shared by all workers of a run.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::traits::queue::WorkQueue;
use crate::types::work::WorkUnit;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<WorkUnit>,
    in_flight: HashMap<Uuid, WorkUnit>,
}

/// FIFO queue with in-flight tracking.
///
/// A claimer waits while the queue is empty but other units are in flight,
/// since those may still derive more work. The queue is drained once both
/// are empty.
#[derive(Default)]
pub struct MemoryWorkQueue {
    state: Mutex<QueueState>,
    changed: Notify,
}

impl MemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of claimed, not yet completed units.
    pub fn in_flight_count(&self) -> usize {
        self.state.lock().unwrap().in_flight.len()
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn enqueue(&self, unit: WorkUnit) -> StoreResult<()> {
        self.state.lock().unwrap().pending.push_back(unit);
        self.changed.notify_waiters();
        Ok(())
    }

    async fn enqueue_many(&self, units: Vec<WorkUnit>) -> StoreResult<()> {
        if units.is_empty() {
            return Ok(());
        }
        self.state.lock().unwrap().pending.extend(units);
        self.changed.notify_waiters();
        Ok(())
    }

    async fn claim(&self, cancel: &CancellationToken) -> StoreResult<Option<WorkUnit>> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            // Register interest before inspecting state so a notification
            // sent in between is not lost.
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().unwrap();
                if let Some(unit) = state.pending.pop_front() {
                    state.in_flight.insert(unit.id, unit.clone());
                    return Ok(Some(unit));
                }
                if state.in_flight.is_empty() {
                    return Ok(None);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = &mut notified => {}
            }
        }
    }

    async fn complete(&self, id: Uuid) -> StoreResult<()> {
        self.state.lock().unwrap().in_flight.remove(&id);
        self.changed.notify_waiters();
        Ok(())
    }

    async fn snapshot(&self) -> StoreResult<Vec<WorkUnit>> {
        let state = self.state.lock().unwrap();
        let mut units: Vec<WorkUnit> = state.in_flight.values().cloned().collect();
        units.sort_by_key(|unit| unit.id);
        units.extend(state.pending.iter().cloned());
        Ok(units)
    }

    async fn pending_count(&self) -> StoreResult<usize> {
        Ok(self.state.lock().unwrap().pending.len())
    }
}
