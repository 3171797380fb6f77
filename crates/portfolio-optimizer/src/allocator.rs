use std::path::Path;
use std::sync::Arc;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use serde_json::json;

use allocation_core::{
    Allocation, AllocationError, AllocationMap, AllocationObserver, AllocationStatus, Allocator,
    HistorySet, OptimizationTrace, Result, SignalContext, SignalDecision, StrategySignal,
};

use crate::cache::CachedAllocations;
use crate::objective::AllocationObjective;
use crate::observer::TracingObserver;
use crate::signal::evaluate_against;
use crate::solver::{self, Problem, SolverSettings};
use crate::stats::ReturnStatistics;

/// Parameters shared by every objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Ceiling on the sum of weights (2.0 = 200% of equity).
    pub max_leverage: f64,
    /// Per-strategy ceiling as a fraction.
    pub max_single_strategy: f64,
    /// Weights below this fraction are dropped from the output map.
    pub min_allocation: f64,
    /// Daily risk-free rate subtracted in the Sharpe objective.
    pub risk_free_rate: f64,
    /// Solver iteration budget per allocation.
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            max_leverage: 2.0,
            max_single_strategy: 1.0,
            min_allocation: 0.01,
            risk_free_rate: 0.0,
            max_iterations: 500,
            tolerance: 1e-9,
        }
    }
}

impl AllocatorConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.max_leverage.is_finite() || self.max_leverage <= 0.0 {
            return Err(AllocationError::InvalidConfig(format!(
                "max_leverage must be positive, got {}",
                self.max_leverage
            )));
        }
        if !self.max_single_strategy.is_finite() || self.max_single_strategy <= 0.0 {
            return Err(AllocationError::InvalidConfig(format!(
                "max_single_strategy must be positive, got {}",
                self.max_single_strategy
            )));
        }
        if !self.min_allocation.is_finite() || self.min_allocation < 0.0 {
            return Err(AllocationError::InvalidConfig(format!(
                "min_allocation must be >= 0, got {}",
                self.min_allocation
            )));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(AllocationError::InvalidConfig(
                "risk_free_rate must be finite".to_string(),
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(AllocationError::InvalidConfig(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// One allocator for all objectives: estimate moments, solve the constrained
/// problem from an equal-weight start, convert to a percent map. Solver
/// failure falls back to equal weights.
pub struct PortfolioAllocator {
    config: AllocatorConfig,
    objective: AllocationObjective,
    cache: Option<CachedAllocations>,
    last_allocation: Option<Allocation>,
    observer: Arc<dyn AllocationObserver>,
}

impl std::fmt::Debug for PortfolioAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioAllocator")
            .field("config", &self.config)
            .field("objective", &self.objective)
            .field("cache", &self.cache)
            .field("last_allocation", &self.last_allocation)
            .finish_non_exhaustive()
    }
}

impl PortfolioAllocator {
    pub fn new(config: AllocatorConfig, objective: AllocationObjective) -> Result<Self> {
        config.validate()?;
        objective.validate().map_err(AllocationError::InvalidConfig)?;
        Ok(Self {
            config,
            objective,
            cache: None,
            last_allocation: None,
            observer: Arc::new(TracingObserver),
        })
    }

    pub fn max_sharpe(config: AllocatorConfig) -> Result<Self> {
        Self::new(config, AllocationObjective::MaxSharpe)
    }

    pub fn max_cagr(
        config: AllocatorConfig,
        min_sharpe: f64,
        max_drawdown_limit: f64,
    ) -> Result<Self> {
        Self::new(
            config,
            AllocationObjective::MaxCagrWithSharpeFloor {
                min_sharpe,
                max_drawdown_limit,
            },
        )
    }

    pub fn hybrid(
        config: AllocatorConfig,
        alpha: f64,
        cagr_target: f64,
        max_drawdown_limit: f64,
    ) -> Result<Self> {
        Self::new(
            config,
            AllocationObjective::Hybrid {
                alpha,
                cagr_target,
                max_drawdown_limit,
            },
        )
    }

    /// Enable cached mode from a file. A load failure is logged and leaves
    /// the allocator optimizing dynamically.
    pub fn with_cached_allocations(self, path: impl AsRef<Path>) -> Self {
        match CachedAllocations::load(path) {
            Ok(cache) => self.with_cache(cache),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Cached allocations unavailable, optimizing dynamically"
                );
                self
            }
        }
    }

    pub fn with_cache(mut self, cache: CachedAllocations) -> Self {
        if !matches!(self.objective, AllocationObjective::Hybrid { .. }) {
            tracing::warn!(
                objective = self.objective.name(),
                "Cached allocations are only supported by the hybrid objective, ignoring"
            );
            return self;
        }
        tracing::info!(strategies = cache.allocations().len(), "Loaded cached allocations");
        self.cache = Some(cache);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn AllocationObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    pub fn objective(&self) -> &AllocationObjective {
        &self.objective
    }

    /// True when `allocate` will return the cached map without optimizing.
    pub fn cached_mode_active(&self) -> bool {
        self.cache.as_ref().is_some_and(|c| !c.is_empty())
    }

    pub fn last_allocation(&self) -> Option<&Allocation> {
        self.last_allocation.as_ref()
    }

    fn optimize(&self, history: &HistorySet) -> Allocation {
        let stats = match ReturnStatistics::estimate(history) {
            Ok(stats) => stats,
            Err(e) => {
                let ids: Vec<String> = history
                    .iter()
                    .filter(|(_, h)| !h.returns.is_empty())
                    .map(|(id, _)| id.clone())
                    .collect();
                let ids = if ids.is_empty() {
                    history.keys().cloned().collect()
                } else {
                    ids
                };
                return self.equal_weight(&ids, e.to_string(), 0);
            }
        };

        let n = stats.len();
        let rf = self.config.risk_free_rate;
        let problem = Problem {
            objective: self.objective.objective(&stats, rf),
            constraints: self.objective.constraints(&stats, rf),
            upper: self.config.max_single_strategy,
            max_sum: self.config.max_leverage,
        };
        let settings = SolverSettings {
            max_iterations: self.config.max_iterations,
            tolerance: self.config.tolerance,
        };
        let x0 = DVector::from_element(n, 1.0 / n as f64);
        let objective_name = self.objective.name();
        let observer = Arc::clone(&self.observer);

        let solution = solver::minimize(&problem, &x0, &settings, |iteration, w, value, violation| {
            observer.on_iteration(&OptimizationTrace {
                objective: objective_name,
                iteration,
                weights: w.iter().copied().collect(),
                objective_value: value,
                max_violation: violation,
            });
        });

        if !solution.converged {
            return self.equal_weight(&stats.ids, solution.message, solution.iterations);
        }

        Allocation {
            weights: to_percent_map(
                &stats.ids,
                solution.weights.as_slice(),
                self.config.min_allocation,
            ),
            status: AllocationStatus::Optimized,
            objective_value: Some(solution.objective),
            iterations: solution.iterations,
        }
    }

    fn equal_weight(&self, ids: &[String], reason: String, iterations: usize) -> Allocation {
        tracing::warn!(
            objective = self.objective.name(),
            strategies = ids.len(),
            reason = %reason,
            "Optimization failed, falling back to equal weights"
        );
        Allocation {
            weights: equal_weight_map(
                ids,
                self.config.max_single_strategy,
                self.config.max_leverage,
            ),
            status: AllocationStatus::EqualWeightFallback { reason },
            objective_value: None,
            iterations,
        }
    }
}

impl Allocator for PortfolioAllocator {
    fn name(&self) -> &'static str {
        self.objective.name()
    }

    fn max_leverage(&self) -> f64 {
        self.config.max_leverage
    }

    fn allocate(&mut self, history: &HistorySet) -> Allocation {
        let allocation = match &self.cache {
            Some(cache) if !cache.is_empty() => Allocation::cached(cache.allocations().clone()),
            _ => self.optimize(history),
        };
        self.observer.on_allocation(self.objective.name(), &allocation);
        self.last_allocation = Some(allocation.clone());
        allocation
    }

    fn evaluate_signal(&self, signal: &StrategySignal, context: &SignalContext) -> SignalDecision {
        let allocations = match &self.cache {
            Some(cache) if !cache.is_empty() => Some(cache.allocations()),
            _ => self.last_allocation().map(|a| &a.weights),
        };
        evaluate_against(allocations, signal, context)
    }

    fn set_observer(&mut self, observer: Arc<dyn AllocationObserver>) {
        self.observer = observer;
    }

    fn config_snapshot(&self) -> serde_json::Value {
        json!({
            "allocator": self.objective.name(),
            "config": self.config,
            "objective": self.objective,
            "cached_mode": self.cached_mode_active(),
        })
    }
}

/// Fractions to percent, rounded to 2 decimals; weights below `min_allocation`
/// (and non-positive ones) are dropped.
pub fn to_percent_map(ids: &[String], weights: &[f64], min_allocation: f64) -> AllocationMap {
    ids.iter()
        .zip(weights)
        .filter(|(_, &w)| w.is_finite() && w > 0.0 && w >= min_allocation)
        .map(|(id, &w)| (id.clone(), round2(w * 100.0)))
        .collect()
}

/// `100/n` percent each, clipped so the per-strategy cap and the leverage
/// ceiling still hold.
pub fn equal_weight_map(
    ids: &[String],
    max_single_strategy: f64,
    max_leverage: f64,
) -> AllocationMap {
    if ids.is_empty() {
        return AllocationMap::new();
    }
    let n = ids.len() as f64;
    let w = (1.0 / n).min(max_single_strategy).min(max_leverage / n);
    ids.iter()
        .map(|id| (id.clone(), round2(w * 100.0)))
        .collect()
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::daily_sharpe;
    use allocation_core::metrics::{self, TRADING_DAYS_PER_YEAR};
    use allocation_core::{SignalDirection, StrategyHistory};
    use std::sync::Mutex;

    fn repeat(pattern: &[f64], n: usize) -> Vec<f64> {
        pattern.iter().copied().cycle().take(n).collect()
    }

    fn three_strategies() -> HistorySet {
        let mut h = HistorySet::new();
        h.insert(
            "trend".to_string(),
            StrategyHistory::new(repeat(&[0.012, -0.004, 0.006, -0.002, 0.009], 120)),
        );
        h.insert(
            "carry".to_string(),
            StrategyHistory::new(repeat(&[0.003, 0.002, -0.001, 0.004], 120)),
        );
        h.insert(
            "meanrev".to_string(),
            StrategyHistory::new(repeat(&[-0.006, 0.011, -0.003, 0.001, 0.002, -0.001], 120)),
        );
        h
    }

    fn winner_and_loser() -> HistorySet {
        let mut h = HistorySet::new();
        h.insert("good".to_string(), StrategyHistory::new(repeat(&[0.01, 0.0], 60)));
        h.insert(
            "bad".to_string(),
            StrategyHistory::new(repeat(&[-0.01, -0.01, 0.0, 0.0], 60)),
        );
        h
    }

    /// Ten up days of +2% then five down days of -3%, eight times over.
    /// Fully invested it draws down about 14% per cycle.
    fn risky_returns() -> Vec<f64> {
        let mut cycle = vec![0.02; 10];
        cycle.extend([-0.03; 5]);
        repeat(&cycle, 120)
    }

    fn risky_and_steady() -> HistorySet {
        let mut h = HistorySet::new();
        h.insert("risky".to_string(), StrategyHistory::new(risky_returns()));
        h.insert("steady".to_string(), StrategyHistory::new(vec![0.0005; 120]));
        h
    }

    fn long_budget() -> AllocatorConfig {
        AllocatorConfig {
            max_iterations: 5000,
            ..Default::default()
        }
    }

    /// Fractional weights of `allocation` in the column order of `stats`.
    fn weights_of(stats: &ReturnStatistics, allocation: &Allocation) -> DVector<f64> {
        DVector::from_iterator(
            stats.len(),
            stats.ids.iter().map(|id| allocation.weight(id) / 100.0),
        )
    }

    #[derive(Default)]
    struct RecordingObserver {
        iterations: Mutex<Vec<OptimizationTrace>>,
        allocations: Mutex<Vec<String>>,
    }

    impl AllocationObserver for RecordingObserver {
        fn on_iteration(&self, trace: &OptimizationTrace) {
            self.iterations.lock().unwrap().push(trace.clone());
        }

        fn on_allocation(&self, allocator: &str, _allocation: &Allocation) {
            self.allocations.lock().unwrap().push(allocator.to_string());
        }
    }

    fn assert_within_bounds(allocation: &Allocation, config: &AllocatorConfig) {
        for (id, &w) in &allocation.weights {
            assert!(w >= 0.0, "{} has negative weight {}", id, w);
            assert!(
                w <= config.max_single_strategy * 100.0 + 1e-9,
                "{} exceeds per-strategy cap: {}",
                id,
                w
            );
        }
        assert!(
            allocation.total_percent() <= config.max_leverage * 100.0 + 0.05,
            "total {} exceeds leverage",
            allocation.total_percent()
        );
    }

    // ===== Bounds =====

    #[test]
    fn test_allocation_bounds_for_every_objective() {
        let config = AllocatorConfig {
            max_leverage: 1.5,
            max_single_strategy: 0.6,
            ..Default::default()
        };
        let objectives = [
            AllocationObjective::MaxSharpe,
            AllocationObjective::max_cagr(),
            AllocationObjective::hybrid(),
        ];
        for objective in objectives {
            let mut allocator = PortfolioAllocator::new(config.clone(), objective).unwrap();
            let allocation = allocator.allocate(&three_strategies());
            assert_within_bounds(&allocation, &config);
        }
    }

    #[test]
    fn test_max_sharpe_excludes_losing_strategy() {
        let mut allocator = PortfolioAllocator::max_sharpe(AllocatorConfig::default()).unwrap();
        let allocation = allocator.allocate(&winner_and_loser());
        assert_eq!(allocation.status, AllocationStatus::Optimized);
        assert!(allocation.weight("good") > 1.0);
        assert!(allocation.weight("bad") < 1.0);
    }

    #[test]
    fn test_max_cagr_fills_caps_when_feasible() {
        let mut h = HistorySet::new();
        h.insert("a".to_string(), StrategyHistory::new(repeat(&[0.02, -0.005], 40)));
        h.insert("b".to_string(), StrategyHistory::new(repeat(&[-0.004, 0.006], 40)));
        let mut allocator =
            PortfolioAllocator::max_cagr(AllocatorConfig::default(), 1.0, -0.25).unwrap();
        let allocation = allocator.allocate(&h);
        assert_eq!(allocation.status, AllocationStatus::Optimized);
        assert!((allocation.weight("a") - 100.0).abs() < 0.5);
        assert!((allocation.weight("b") - 100.0).abs() < 0.5);
    }

    // ===== Binding constraints =====

    #[test]
    fn test_max_cagr_holds_drawdown_limit() {
        let h = risky_and_steady();
        let mut allocator = PortfolioAllocator::max_cagr(long_budget(), 1.0, -0.10).unwrap();
        let allocation = allocator.allocate(&h);
        assert_eq!(allocation.status, AllocationStatus::Optimized);

        let stats = ReturnStatistics::estimate(&h).unwrap();
        let w = weights_of(&stats, &allocation);
        let dd = metrics::max_drawdown(&stats.portfolio_returns(&w));
        assert!(dd >= -0.10 - 1e-3, "drawdown {} breaks the -10% limit", dd);
        // Fully invested in "risky" would draw down ~14%, so the limit is active.
        assert!(dd < -0.08, "drawdown limit should bind, got {}", dd);
        assert!(allocation.weight("risky") < 90.0);
        assert!(allocation.weight("steady") > 90.0);

        let sharpe = daily_sharpe(&stats, &w, 0.0) * TRADING_DAYS_PER_YEAR.sqrt();
        assert!(sharpe >= 1.0 - 1e-3, "annualized sharpe {} below floor", sharpe);
    }

    #[test]
    fn test_max_cagr_holds_sharpe_floor() {
        let h = risky_and_steady();
        let mut allocator = PortfolioAllocator::max_cagr(long_budget(), 3.0, -0.25).unwrap();
        let allocation = allocator.allocate(&h);
        assert_eq!(allocation.status, AllocationStatus::Optimized);

        let stats = ReturnStatistics::estimate(&h).unwrap();
        let w = weights_of(&stats, &allocation);
        let sharpe = daily_sharpe(&stats, &w, 0.0) * TRADING_DAYS_PER_YEAR.sqrt();
        assert!(sharpe >= 3.0 - 1e-3, "annualized sharpe {} below floor", sharpe);
        // More "risky" raises CAGR but dilutes the riskless carry, so the floor binds.
        assert!(sharpe < 3.2, "sharpe floor should bind, got {}", sharpe);
        assert!((20.0..60.0).contains(&allocation.weight("risky")));

        let dd = metrics::max_drawdown(&stats.portfolio_returns(&w));
        assert!(dd >= -0.25 - 1e-3);
    }

    #[test]
    fn test_hybrid_holds_drawdown_limit() {
        let mut h = HistorySet::new();
        h.insert("risky".to_string(), StrategyHistory::new(risky_returns()));
        let mut allocator = PortfolioAllocator::hybrid(long_budget(), 0.5, 0.5, -0.10).unwrap();
        let allocation = allocator.allocate(&h);
        assert_eq!(allocation.status, AllocationStatus::Optimized);

        let stats = ReturnStatistics::estimate(&h).unwrap();
        let w = weights_of(&stats, &allocation);
        let returns = stats.portfolio_returns(&w);
        let dd = metrics::max_drawdown(&returns);
        assert!(dd >= -0.10 - 1e-3, "drawdown {} breaks the -10% limit", dd);
        assert!(dd < -0.08, "drawdown limit should bind, got {}", dd);
        // (1 - 0.03 w)^5 = 0.9 puts the limit at w ~ 0.695.
        assert!((allocation.weight("risky") - 69.5).abs() < 2.0);

        let blended = 0.5 * daily_sharpe(&stats, &w, 0.0) + 0.5 * metrics::cagr(&returns) / 0.5;
        let objective_value = allocation.objective_value.unwrap();
        assert!(
            (objective_value + blended).abs() < 1e-3,
            "objective {} vs blend {}",
            objective_value,
            blended
        );
    }

    // ===== Equal-weight fallback =====

    #[test]
    fn test_fallback_when_solver_has_no_budget() {
        let config = AllocatorConfig {
            max_iterations: 0,
            ..Default::default()
        };
        let mut allocator = PortfolioAllocator::max_sharpe(config).unwrap();
        let allocation = allocator.allocate(&three_strategies());
        assert!(allocation.status.is_fallback());
        assert_eq!(allocation.weights.len(), 3);
        for w in allocation.weights.values() {
            assert!((w - 33.33).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fallback_on_pathological_inputs() {
        let mut h = HistorySet::new();
        h.insert("a".to_string(), StrategyHistory::new(vec![0.01, f64::INFINITY, 0.02]));
        h.insert("b".to_string(), StrategyHistory::new(vec![0.01, 0.0, -0.01]));
        h.insert("c".to_string(), StrategyHistory::new(vec![0.0, 0.01, 0.0]));
        h.insert("d".to_string(), StrategyHistory::new(vec![0.02, 0.01, 0.0]));
        let mut allocator =
            PortfolioAllocator::hybrid(AllocatorConfig::default(), 0.5, 0.5, -0.25).unwrap();
        let allocation = allocator.allocate(&h);
        assert!(allocation.status.is_fallback());
        assert_eq!(allocation.weights.len(), 4);
        assert!(allocation.weights.values().all(|&w| (w - 25.0).abs() < 1e-9));
    }

    #[test]
    fn test_equal_weight_respects_cap() {
        let ids: Vec<String> = vec!["a".into(), "b".into()];
        let map = equal_weight_map(&ids, 0.3, 2.0);
        assert_eq!(map.get("a"), Some(&30.0));
        let map = equal_weight_map(&ids, 1.0, 0.5);
        assert_eq!(map.get("b"), Some(&25.0));
        assert!(equal_weight_map(&[], 1.0, 2.0).is_empty());
    }

    #[test]
    fn test_percent_conversion_rounds_and_drops() {
        let ids: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let map = to_percent_map(&ids, &[0.123456, 0.005, 0.0], 0.01);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("a"), Some(&12.35));
    }

    // ===== Cached mode =====

    #[test]
    fn test_cached_mode_returns_cache_verbatim() {
        let cache =
            CachedAllocations::from_json_str(r#"{"allocations": {"A": 40.0, "B": 0.0, "C": 25.0}}"#)
                .unwrap();
        let mut allocator = PortfolioAllocator::hybrid(AllocatorConfig::default(), 0.5, 0.5, -0.25)
            .unwrap()
            .with_cache(cache);
        assert!(allocator.cached_mode_active());

        let expected: AllocationMap = [("A".to_string(), 40.0), ("C".to_string(), 25.0)]
            .into_iter()
            .collect();
        let first = allocator.allocate(&three_strategies());
        let second = allocator.allocate(&HistorySet::new());
        assert_eq!(first.weights, expected);
        assert_eq!(second.weights, expected);
        assert_eq!(first.status, AllocationStatus::Cached);
    }

    #[test]
    fn test_cache_ignored_for_non_hybrid() {
        let cache = CachedAllocations::from_map([("A".to_string(), 40.0)].into_iter().collect());
        let allocator = PortfolioAllocator::max_sharpe(AllocatorConfig::default())
            .unwrap()
            .with_cache(cache);
        assert!(!allocator.cached_mode_active());
    }

    #[test]
    fn test_bad_cache_path_disables_cached_mode() {
        let path = std::env::temp_dir().join("portfolio_optimizer_no_such_cache.json");
        let mut allocator = PortfolioAllocator::hybrid(AllocatorConfig::default(), 0.5, 0.5, -0.25)
            .unwrap()
            .with_cached_allocations(&path);
        assert!(!allocator.cached_mode_active());
        let allocation = allocator.allocate(&three_strategies());
        assert_ne!(allocation.status, AllocationStatus::Cached);
    }

    #[test]
    fn test_empty_cache_optimizes_dynamically() {
        let allocator = PortfolioAllocator::hybrid(AllocatorConfig::default(), 0.5, 0.5, -0.25)
            .unwrap()
            .with_cache(CachedAllocations::default());
        assert!(!allocator.cached_mode_active());
    }

    // ===== Observer and signals =====

    #[test]
    fn test_observer_receives_iterations() {
        let observer = Arc::new(RecordingObserver::default());
        let mut allocator = PortfolioAllocator::max_sharpe(AllocatorConfig::default())
            .unwrap()
            .with_observer(observer.clone());
        let allocation = allocator.allocate(&winner_and_loser());
        assert_eq!(allocation.status, AllocationStatus::Optimized);

        let iterations = observer.iterations.lock().unwrap();
        assert!(!iterations.is_empty());
        assert!(iterations.iter().all(|t| t.objective == "max_sharpe"));
        assert!(iterations.iter().all(|t| t.weights.len() == 2));
        assert!(iterations.iter().all(|t| t.iteration <= allocation.iterations));
        assert_eq!(*observer.allocations.lock().unwrap(), vec!["max_sharpe".to_string()]);
    }

    #[test]
    fn test_evaluate_signal_uses_last_allocation() {
        let mut allocator = PortfolioAllocator::max_sharpe(AllocatorConfig {
            max_iterations: 0,
            ..Default::default()
        })
        .unwrap();
        let signal = StrategySignal {
            strategy_id: "trend".to_string(),
            direction: SignalDirection::Short,
            quantity: 3.0,
        };
        let ctx = SignalContext {
            account_equity: 90_000.0,
        };
        assert!(allocator.last_allocation().is_none());
        assert!(!allocator.evaluate_signal(&signal, &ctx).approved);

        let allocation = allocator.allocate(&three_strategies());
        assert_eq!(allocator.last_allocation(), Some(&allocation));
        let decision = allocator.evaluate_signal(&signal, &ctx);
        assert!(decision.approved);
        assert_eq!(decision.direction, SignalDirection::Short);
        assert!((decision.allocated_capital - 90_000.0 * 0.3333).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AllocatorConfig {
            max_leverage: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            PortfolioAllocator::max_sharpe(config),
            Err(AllocationError::InvalidConfig(_))
        ));
        assert!(PortfolioAllocator::hybrid(AllocatorConfig::default(), 2.0, 0.5, -0.25).is_err());
    }

    #[test]
    fn test_config_snapshot() {
        let allocator =
            PortfolioAllocator::hybrid(AllocatorConfig::default(), 0.5, 0.5, -0.25).unwrap();
        let snapshot = allocator.config_snapshot();
        assert_eq!(snapshot["allocator"], "hybrid");
        assert_eq!(snapshot["config"]["max_leverage"], 2.0);
        assert_eq!(snapshot["objective"]["type"], "hybrid");
        assert_eq!(snapshot["cached_mode"], false);
    }
}
