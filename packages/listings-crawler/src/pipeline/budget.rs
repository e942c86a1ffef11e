//! Global enumeration budget.
//!
//! One controller is shared by every worker of a run. Emission is two-phase:
//! [`BudgetController::try_emit`] reserves a slot, and the caller then either
//! [`confirm`](BudgetController::confirm)s it once the record is written or
//! [`release`](BudgetController::release)s it when the write fails. The
//! emitted count only grows and the abort latch only goes from `false` to
//! `true`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitPermit {
    /// One slot is reserved; confirm or release it.
    Allowed,
    /// No slot is free; the caller must not emit.
    Exhausted,
}

/// Persistable view of the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    pub max_allowed: Option<u64>,
    pub emitted_count: u64,
    pub aborted: bool,
}

#[derive(Debug)]
pub struct BudgetController {
    max_allowed: Option<u64>,
    /// Confirmed plus outstanding reservations; never above `max_allowed`.
    reserved: AtomicU64,
    emitted: AtomicU64,
    aborted: AtomicBool,
    cancel: CancellationToken,
}

impl BudgetController {
    /// Create a controller; `None` means no limit.
    pub fn new(max_allowed: Option<u64>) -> Self {
        Self {
            max_allowed,
            reserved: AtomicU64::new(0),
            emitted: AtomicU64::new(0),
            aborted: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Resume from a persisted snapshot, keeping the configured maximum.
    pub fn restore(max_allowed: Option<u64>, snapshot: &BudgetSnapshot) -> Self {
        let controller = Self::new(max_allowed);
        controller
            .reserved
            .store(snapshot.emitted_count, Ordering::SeqCst);
        controller
            .emitted
            .store(snapshot.emitted_count, Ordering::SeqCst);
        let spent = max_allowed.is_some_and(|max| snapshot.emitted_count >= max);
        if snapshot.aborted || spent {
            controller.latch();
        }
        controller
    }

    /// Atomically reserve one emission slot.
    ///
    /// Reservations never exceed the maximum. `Exhausted` latches the abort
    /// flag only once every slot is confirmed; while reservations are still
    /// outstanding a failed write may hand its slot back.
    pub fn try_emit(&self) -> EmitPermit {
        if self.is_aborted() {
            return EmitPermit::Exhausted;
        }

        let Some(max) = self.max_allowed else {
            self.reserved.fetch_add(1, Ordering::SeqCst);
            return EmitPermit::Allowed;
        };

        let reserved = self
            .reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count < max).then_some(count + 1)
            });

        match reserved {
            Ok(_) => EmitPermit::Allowed,
            Err(_) => {
                if self.emitted_count() >= max {
                    self.latch();
                }
                EmitPermit::Exhausted
            }
        }
    }

    /// Count a reserved slot as emitted. The confirmation that reaches the
    /// maximum latches the abort flag and cancels the run.
    pub fn confirm(&self) {
        let emitted = self.emitted.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(max) = self.max_allowed {
            if emitted >= max && !self.is_aborted() {
                info!(max_allowed = max, "listing budget reached, stopping run");
                self.latch();
            }
        }
    }

    /// Hand back a reserved slot whose record was not written.
    pub fn release(&self) {
        let _ = self
            .reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                count.checked_sub(1)
            });
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Confirmed emissions.
    pub fn emitted_count(&self) -> u64 {
        self.emitted.load(Ordering::SeqCst)
    }

    pub fn max_allowed(&self) -> Option<u64> {
        self.max_allowed
    }

    /// Token cancelled when the budget latches; workers watch it.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        BudgetSnapshot {
            max_allowed: self.max_allowed,
            emitted_count: self.emitted_count(),
            aborted: self.is_aborted(),
        }
    }

    fn latch(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn emit(budget: &BudgetController) -> EmitPermit {
        let permit = budget.try_emit();
        if permit == EmitPermit::Allowed {
            budget.confirm();
        }
        permit
    }

    #[test]
    fn test_unlimited_budget_never_exhausts() {
        let budget = BudgetController::new(None);
        for _ in 0..1000 {
            assert_eq!(emit(&budget), EmitPermit::Allowed);
        }
        assert_eq!(budget.emitted_count(), 1000);
        assert!(!budget.is_aborted());
    }

    #[test]
    fn test_latches_at_maximum() {
        let budget = BudgetController::new(Some(2));
        assert_eq!(emit(&budget), EmitPermit::Allowed);
        assert!(!budget.is_aborted());
        assert_eq!(emit(&budget), EmitPermit::Allowed);
        assert!(budget.is_aborted());
        assert!(budget.cancellation().is_cancelled());
        assert_eq!(budget.try_emit(), EmitPermit::Exhausted);
        assert_eq!(budget.emitted_count(), 2);
    }

    #[test]
    fn test_zero_budget_emits_nothing() {
        let budget = BudgetController::new(Some(0));
        assert_eq!(budget.try_emit(), EmitPermit::Exhausted);
        assert!(budget.is_aborted());
        assert_eq!(budget.emitted_count(), 0);
    }

    #[test]
    fn test_released_slot_can_be_reserved_again() {
        let budget = BudgetController::new(Some(1));
        assert_eq!(budget.try_emit(), EmitPermit::Allowed);

        // Slot outstanding: others are turned away but the run keeps going.
        assert_eq!(budget.try_emit(), EmitPermit::Exhausted);
        assert!(!budget.is_aborted());

        budget.release();
        assert_eq!(budget.emitted_count(), 0);

        assert_eq!(budget.try_emit(), EmitPermit::Allowed);
        budget.confirm();
        assert_eq!(budget.emitted_count(), 1);
        assert!(budget.is_aborted());
    }

    #[test]
    fn test_restore_keeps_count_and_latch() {
        let snapshot = BudgetSnapshot {
            max_allowed: Some(10),
            emitted_count: 4,
            aborted: false,
        };
        let budget = BudgetController::restore(Some(10), &snapshot);
        assert_eq!(budget.emitted_count(), 4);
        assert!(!budget.is_aborted());

        let spent = BudgetController::restore(Some(3), &snapshot);
        assert!(spent.is_aborted());
        assert_eq!(spent.try_emit(), EmitPermit::Exhausted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_emitters_at_the_edge() {
        let budget = Arc::new(BudgetController::new(Some(100)));
        for _ in 0..99 {
            assert_eq!(emit(&budget), EmitPermit::Allowed);
        }

        let mut handles = Vec::new();
        for _ in 0..10 {
            let budget = budget.clone();
            handles.push(tokio::spawn(async move { emit(&budget) }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() == EmitPermit::Allowed {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 1);
        assert_eq!(budget.emitted_count(), 100);
        assert!(budget.is_aborted());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_counter_never_exceeds_maximum_under_contention() {
        let budget = Arc::new(BudgetController::new(Some(500)));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let budget = budget.clone();
            handles.push(tokio::spawn(async move {
                let mut mine = 0u64;
                let mut last_seen = 0u64;
                while !budget.is_aborted() {
                    if emit(&budget) == EmitPermit::Allowed {
                        mine += 1;
                    }
                    let now = budget.emitted_count();
                    assert!(now >= last_seen);
                    assert!(now <= 500);
                    last_seen = now;
                    tokio::task::yield_now().await;
                }
                mine
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        assert_eq!(total, 500);
        assert_eq!(budget.emitted_count(), 500);
    }
}
