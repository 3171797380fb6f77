pub mod allocator;
pub mod cache;
pub mod objective;
pub mod observer;
pub mod signal;
pub mod solver;
pub mod stats;

pub use allocator::{AllocatorConfig, PortfolioAllocator};
pub use cache::CachedAllocations;
pub use objective::AllocationObjective;
pub use observer::{NoopObserver, TracingObserver};
pub use stats::{correlation_matrix, sample_covariance, ReturnStatistics};
