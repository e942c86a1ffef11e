//! Queue and run-state storage backends.

pub mod file_state;
pub mod memory_queue;
pub mod memory_state;

pub use file_state::FileStateStore;
pub use memory_queue::MemoryWorkQueue;
pub use memory_state::MemoryStateStore;
