//! Enumeration pipeline: partitioning, budget, detail resolution and the
//! orchestrator that ties them to the work queue.

pub mod budget;
pub mod detail;
pub mod orchestrator;
pub mod partition;

pub use budget::{BudgetController, BudgetSnapshot, EmitPermit};
pub use detail::{DetailMapper, DetailOutcome};
pub use orchestrator::{Orchestrator, RunSummary};
pub use partition::{Action, Partitioner, Undercount};
