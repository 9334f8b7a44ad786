//! `AtomStore` (WAL-backed persistence) and the striped 2Q `AtomCache`
//! (spec.md §4.2, §4.3).

#![warn(missing_docs)]

pub mod atom_store;
pub mod cache;
pub mod metrics;
pub mod single_flight;

pub use atom_store::AtomStore;
pub use cache::{CacheLimits, TwoQCache};
pub use metrics::{CacheKind, EvictionReason, InMemoryMetricsSink, LatencyKind, MetricsSink, NoopMetricsSink};
pub use single_flight::SingleFlight;
