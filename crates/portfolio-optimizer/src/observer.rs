use allocation_core::{Allocation, AllocationObserver, OptimizationTrace};

/// Forwards optimizer diagnostics to `tracing` at trace/debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl AllocationObserver for TracingObserver {
    fn on_iteration(&self, trace: &OptimizationTrace) {
        tracing::trace!(
            objective = trace.objective,
            iteration = trace.iteration,
            value = trace.objective_value,
            max_violation = trace.max_violation,
            weights = ?trace.weights,
            "optimizer iteration"
        );
    }

    fn on_allocation(&self, allocator: &str, allocation: &Allocation) {
        tracing::debug!(
            allocator,
            status = allocation.status.label(),
            iterations = allocation.iterations,
            total_pct = allocation.total_percent(),
            "allocation computed"
        );
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl AllocationObserver for NoopObserver {}
