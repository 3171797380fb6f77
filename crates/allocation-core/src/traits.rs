use std::sync::Arc;

use crate::{
    Allocation, HistorySet, OptimizationTrace, SignalContext, SignalDecision, StrategySignal,
};

/// Receives optimizer diagnostics. Both hooks default to no-ops.
pub trait AllocationObserver: Send + Sync {
    fn on_iteration(&self, _trace: &OptimizationTrace) {}

    fn on_allocation(&self, _allocator: &str, _allocation: &Allocation) {}
}

/// Common contract for every allocation strategy.
///
/// `allocate` never fails: unusable inputs and solver failures are reported
/// through [`crate::AllocationStatus::EqualWeightFallback`].
pub trait Allocator: Send {
    fn name(&self) -> &'static str;

    /// Ceiling on the sum of weights, as a fraction (2.0 = 200%).
    fn max_leverage(&self) -> f64;

    fn allocate(&mut self, history: &HistorySet) -> Allocation;

    /// Approve or reject a live signal against the last computed allocation.
    fn evaluate_signal(&self, signal: &StrategySignal, context: &SignalContext) -> SignalDecision;

    fn set_observer(&mut self, observer: Arc<dyn AllocationObserver>);

    /// Parameters recorded alongside run artifacts.
    fn config_snapshot(&self) -> serde_json::Value;
}
