//! Work queue trait.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::types::work::WorkUnit;

/// Multi-producer / multi-consumer queue of pending work.
///
/// Ordering is FIFO-ish at best. Duplicate units are accepted; deduplication
/// happens downstream by listing id.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Add a unit to the back of the queue.
    async fn enqueue(&self, unit: WorkUnit) -> StoreResult<()>;

    /// Add several units, preserving their order.
    async fn enqueue_many(&self, units: Vec<WorkUnit>) -> StoreResult<()> {
        for unit in units {
            self.enqueue(unit).await?;
        }
        Ok(())
    }

    /// Take the next unit, waiting while other units are in flight.
    ///
    /// Returns `None` once the queue is drained (nothing pending and nothing in
    /// flight) or when `cancel` fires.
    async fn claim(&self, cancel: &CancellationToken) -> StoreResult<Option<WorkUnit>>;

    /// Release a claimed unit. Derived and retried work must be enqueued
    /// before completing the unit it came from.
    async fn complete(&self, id: Uuid) -> StoreResult<()>;

    /// Pending plus in-flight units, for persistence.
    async fn snapshot(&self) -> StoreResult<Vec<WorkUnit>>;

    /// Number of pending units.
    async fn pending_count(&self) -> StoreResult<usize>;
}
