use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Strategy id -> weight in percent of equity (40.0 = 40%).
///
/// Totals above 100 are legitimate for leveraged portfolios.
pub type AllocationMap = BTreeMap<String, f64>;

/// Raw per-strategy series as supplied by an external loader.
///
/// Every value vector is indexed by `dates`. Optional series may be absent
/// entirely; a vector shorter than `dates` leaves the trailing dates unobserved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategySeries {
    pub dates: Vec<NaiveDate>,
    pub returns: Vec<f64>,
    #[serde(default)]
    pub margin_used: Option<Vec<f64>>,
    #[serde(default, alias = "notional_value")]
    pub notional: Option<Vec<f64>>,
    #[serde(default)]
    pub account_equity: Option<Vec<f64>>,
}

/// Input to a backtest run, keyed by strategy id.
pub type StrategiesData = BTreeMap<String, StrategySeries>;

/// Undated history handed to an allocator, oldest observation first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyHistory {
    pub returns: Vec<f64>,
    pub margin_used: Option<Vec<f64>>,
}

impl StrategyHistory {
    pub fn new(returns: Vec<f64>) -> Self {
        Self {
            returns,
            margin_used: None,
        }
    }

    pub fn with_margin(mut self, margin_used: Vec<f64>) -> Self {
        self.margin_used = Some(margin_used);
        self
    }
}

/// Histories for every strategy in an allocation universe.
pub type HistorySet = BTreeMap<String, StrategyHistory>;

/// How an allocation was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AllocationStatus {
    /// The solver converged and its weights were used.
    Optimized,
    /// The solver failed or the inputs were unusable; weights are `1/n` each.
    EqualWeightFallback { reason: String },
    /// A previously approved allocation set was returned without optimizing.
    Cached,
}

impl AllocationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            AllocationStatus::Optimized => "optimized",
            AllocationStatus::EqualWeightFallback { .. } => "equal_weight_fallback",
            AllocationStatus::Cached => "cached",
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, AllocationStatus::EqualWeightFallback { .. })
    }
}

/// Result of one `Allocator::allocate` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub weights: AllocationMap,
    pub status: AllocationStatus,
    /// Objective value at the returned weights (None for cached/fallback).
    pub objective_value: Option<f64>,
    /// Solver iterations spent.
    pub iterations: usize,
}

impl Allocation {
    pub fn cached(weights: AllocationMap) -> Self {
        Self {
            weights,
            status: AllocationStatus::Cached,
            objective_value: None,
            iterations: 0,
        }
    }

    /// Sum of all weights in percent.
    pub fn total_percent(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn weight(&self, strategy_id: &str) -> f64 {
        self.weights.get(strategy_id).copied().unwrap_or(0.0)
    }
}

// --- Live signal evaluation ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalDirection {
    Long,
    Short,
    Flat,
}

/// A trade signal raised by one strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySignal {
    pub strategy_id: String,
    pub direction: SignalDirection,
    /// Quantity the strategy would trade at a 100% allocation.
    pub quantity: f64,
}

/// Account state at the time a signal is evaluated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignalContext {
    pub account_equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDecision {
    pub approved: bool,
    pub strategy_id: String,
    pub direction: SignalDirection,
    pub allocation_percent: f64,
    pub allocated_capital: f64,
    pub scaled_quantity: f64,
    pub reason: String,
}

/// One solver iteration as reported to an [`crate::AllocationObserver`].
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationTrace {
    pub objective: &'static str,
    pub iteration: usize,
    pub weights: Vec<f64>,
    pub objective_value: f64,
    /// Largest nonlinear constraint violation (0 when feasible).
    pub max_violation: f64,
}
