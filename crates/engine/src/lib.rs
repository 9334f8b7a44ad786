//! Ties storage, durability, concurrency, and query planning into one
//! space-level facade (spec.md §2 control flow, §5 parallel scan, §9 FSM
//! utility).

#![warn(missing_docs)]

pub mod background;
pub mod collections;
pub mod context;
pub mod parallel_scan;
pub mod records;

pub use background::{BackgroundScheduler, BackpressureError, SchedulerStats, TaskPriority, TaskState};
pub use context::StorageContext;
pub use parallel_scan::{parallel_scan, sequential_scan};
pub use records::RecordSource;
