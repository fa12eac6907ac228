//! The concurrent prefetch engine: a bounded worker pool that runs a chain of stateless
//! transforms off the consumer thread, delivered either unordered (`prefetch`) or in strict
//! upstream order (`ordered_prefetch`).

pub mod metrics;
pub mod ordered;
pub mod queue;
pub mod unordered;
pub mod worker;

pub use metrics::{PrefetchMetrics, PrefetchMetricsSnapshot};
pub use ordered::ordered_prefetch;
pub use unordered::prefetch;
