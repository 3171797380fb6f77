use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Datelike;
use nalgebra::DMatrix;

use allocation_core::metrics::TRADING_DAYS_PER_YEAR;
use allocation_core::{
    AllocationMap, AllocationObserver, Allocator, PerformanceMetrics, StrategiesData,
};

use crate::aligner::{align, AlignedMatrix};
use crate::circuit_breaker::DrawdownGuard;
use crate::error::{EngineError, Result};
use crate::margin::{margin_scale_factor, portfolio_margin_fraction, MarginTracker};
use crate::models::*;
use crate::state::PortfolioState;

/// Out-of-sample CAGR (percent) below which the overfitting ratio is undefined.
const MIN_OOS_CAGR_FOR_RATIO: f64 = 0.001;

/// Trains an allocator on each in-sample window and applies its weights to
/// the following test window, carrying equity across windows.
pub struct WalkForwardEngine {
    config: WalkForwardConfig,
    allocator: Box<dyn Allocator>,
}

impl WalkForwardEngine {
    pub fn new(config: WalkForwardConfig, allocator: Box<dyn Allocator>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, allocator })
    }

    /// Attach an optimizer observer for this run.
    pub fn with_observer(mut self, observer: Arc<dyn AllocationObserver>) -> Self {
        self.allocator.set_observer(observer);
        self
    }

    pub fn config(&self) -> &WalkForwardConfig {
        &self.config
    }

    pub fn allocator(&self) -> &dyn Allocator {
        self.allocator.as_ref()
    }

    pub fn align(&self, strategies: &StrategiesData) -> AlignedMatrix {
        align(strategies, self.config.default_account_equity)
    }

    pub fn run(&mut self, strategies: &StrategiesData) -> Result<WalkForwardResult> {
        let aligned = self.align(strategies);
        self.run_aligned(&aligned)
    }

    pub fn run_aligned(&mut self, aligned: &AlignedMatrix) -> Result<WalkForwardResult> {
        if aligned.is_empty() {
            return Err(EngineError::NoReturnData);
        }
        let windows = self.config.windows(aligned.len());
        if windows.is_empty() {
            return Err(EngineError::InsufficientHistory {
                calendar_len: aligned.len(),
                train_days: self.config.train_days,
                test_days: self.config.test_days,
            });
        }

        let guard = DrawdownGuard::new(
            self.config.apply_drawdown_protection,
            self.config.max_drawdown_threshold,
        );
        tracing::info!(
            allocator = self.allocator.name(),
            windows = windows.len(),
            train_days = self.config.train_days,
            test_days = self.config.test_days,
            mode = ?self.config.walk_forward_type,
            drawdown_protection = guard.is_enabled(),
            "Starting walk-forward run"
        );
        let mut state = PortfolioState::new(self.config.initial_capital);
        let mut window_results = Vec::with_capacity(windows.len());
        let mut daily = Vec::with_capacity(windows.len() * self.config.test_days);

        for bounds in &windows {
            let (result, next_state) =
                self.run_window(aligned, bounds, state, &guard, &mut daily);
            state = next_state;
            window_results.push(result);
        }

        Ok(summarize(
            self.allocator.name(),
            aligned,
            &self.config,
            window_results,
            daily,
            state,
        ))
    }

    fn run_window(
        &mut self,
        aligned: &AlignedMatrix,
        bounds: &WindowBounds,
        mut state: PortfolioState,
        guard: &DrawdownGuard,
        daily: &mut Vec<DailyRecord>,
    ) -> (WindowResult, PortfolioState) {
        tracing::debug!(
            window = bounds.index,
            train = ?(bounds.train_start..bounds.train_end),
            test = ?(bounds.test_start..bounds.test_end),
            "Window start"
        );

        let history = aligned.history(bounds.train_start..bounds.train_end);
        let allocation = self.allocator.allocate(&history);
        if allocation.status.is_fallback() {
            tracing::warn!(
                window = bounds.index,
                status = ?allocation.status,
                "Allocator fell back to equal weights"
            );
        }

        let raw_weights = weight_vector(aligned, &allocation.weights);
        let margin_scale = margin_scale_factor(
            aligned,
            bounds.test_start..bounds.test_end,
            &raw_weights,
            self.config.initial_capital,
            self.allocator.max_leverage(),
            self.config.margin_safety_factor,
        );
        if margin_scale < 1.0 {
            tracing::info!(
                window = bounds.index,
                scale = margin_scale,
                "Margin cap scaled allocations"
            );
        }

        let drawdown_scale = guard.window_scale(&state);
        if drawdown_scale < 1.0 {
            tracing::info!(
                window = bounds.index,
                drawdown = state.drawdown(),
                scale = drawdown_scale,
                "Drawdown protection scaled allocations"
            );
        }

        let weights: Vec<f64> = raw_weights
            .iter()
            .map(|w| w * margin_scale * drawdown_scale)
            .collect();

        let start_equity = state.current_equity;
        let mut tracker = MarginTracker::new();
        let mut hard_stop_days = 0usize;
        let mut returns = Vec::with_capacity(bounds.test_len());
        let mut margin_used = Vec::with_capacity(bounds.test_len());
        let mut notional = Vec::with_capacity(bounds.test_len());

        for day in bounds.test_start..bounds.test_end {
            let multiplier = guard.daily_multiplier(&state);
            if multiplier == 0.0 {
                if hard_stop_days == 0 {
                    tracing::warn!(
                        window = bounds.index,
                        date = %aligned.dates[day],
                        drawdown = state.drawdown(),
                        "Drawdown hard stop, flattening"
                    );
                }
                hard_stop_days += 1;
            }

            let day_weights: Vec<f64> = weights.iter().map(|w| w * multiplier).collect();
            let daily_return = weighted_sum(&aligned.returns, day, &day_weights);
            let margin_fraction =
                portfolio_margin_fraction(aligned, day, &day_weights, self.config.initial_capital);
            let margin_dollars = margin_fraction * state.current_equity;
            // Notional is weighted only, not equity-normalized like margin.
            let day_notional = weighted_sum(&aligned.notional, day, &day_weights);

            state = state.apply_return(daily_return);
            tracker.record(margin_fraction);

            returns.push(daily_return);
            margin_used.push(margin_dollars);
            notional.push(day_notional);
            daily.push(DailyRecord {
                date: aligned.dates[day],
                window: bounds.index,
                daily_return,
                equity: state.current_equity,
                peak_equity: state.global_peak_equity,
                drawdown_pct: state.drawdown() * 100.0,
                margin_used: margin_dollars,
                margin_pct: margin_fraction * 100.0,
                notional: day_notional,
                leverage_multiplier: multiplier,
            });
        }

        let in_sample_returns: Vec<f64> = (bounds.train_start..bounds.train_end)
            .map(|day| weighted_sum(&aligned.returns, day, &weights))
            .collect();
        let in_sample = PerformanceMetrics::from_returns(&in_sample_returns);
        let out_of_sample = PerformanceMetrics::from_returns(&returns);

        tracing::info!(
            window = bounds.index,
            status = allocation.status.label(),
            total_pct = allocation.total_percent(),
            is_cagr = in_sample.cagr_pct,
            oos_cagr = out_of_sample.cagr_pct,
            equity = state.current_equity,
            "Window complete"
        );

        let result = WindowResult {
            bounds: *bounds,
            train_start_date: aligned.dates[bounds.train_start],
            train_end_date: aligned.dates[bounds.train_end - 1],
            test_start_date: aligned.dates[bounds.test_start],
            test_end_date: aligned.dates[bounds.test_end - 1],
            final_allocations: percent_map(aligned, &weights),
            raw_allocations: allocation.weights,
            status: allocation.status,
            margin_scale,
            drawdown_scale,
            hard_stop_days,
            start_equity,
            end_equity: state.current_equity,
            peak_margin_pct: tracker.peak_pct(),
            avg_margin_pct: tracker.average_pct(),
            returns,
            margin_used,
            notional,
            in_sample,
            out_of_sample,
        };
        (result, state)
    }
}

/// Allocation percentages as fractions in column order; unknown ids are ignored.
fn weight_vector(aligned: &AlignedMatrix, allocations: &AllocationMap) -> Vec<f64> {
    let mut weights = vec![0.0; aligned.n_strategies()];
    for (id, pct) in allocations {
        match aligned.column_of(id) {
            Some(col) if pct.is_finite() => weights[col] = pct / 100.0,
            _ => tracing::debug!(strategy = %id, "Allocation for unknown strategy ignored"),
        }
    }
    weights
}

fn percent_map(aligned: &AlignedMatrix, weights: &[f64]) -> AllocationMap {
    aligned
        .strategy_ids
        .iter()
        .zip(weights)
        .filter(|(_, &w)| w > 0.0)
        .map(|(id, &w)| (id.clone(), w * 100.0))
        .collect()
}

fn weighted_sum(values: &DMatrix<f64>, day: usize, weights: &[f64]) -> f64 {
    let total: f64 = weights
        .iter()
        .enumerate()
        .filter(|(_, &w)| w != 0.0)
        .map(|(col, w)| w * values[(day, col)])
        .sum();
    if total.is_finite() {
        total
    } else {
        0.0
    }
}

fn summarize(
    allocator: &str,
    aligned: &AlignedMatrix,
    config: &WalkForwardConfig,
    windows: Vec<WindowResult>,
    daily: Vec<DailyRecord>,
    state: PortfolioState,
) -> WalkForwardResult {
    let all_returns: Vec<f64> = daily.iter().map(|d| d.daily_return).collect();
    let metrics = PerformanceMetrics::from_returns(&all_returns);

    let n = windows.len().max(1) as f64;
    let avg_is = windows.iter().map(|w| w.in_sample.cagr_pct).sum::<f64>() / n;
    let avg_oos = windows.iter().map(|w| w.out_of_sample.cagr_pct).sum::<f64>() / n;
    let overfitting_ratio = if avg_oos.abs() > MIN_OOS_CAGR_FOR_RATIO {
        Some(avg_is / avg_oos)
    } else {
        None
    };

    let peak_margin_pct = windows.iter().map(|w| w.peak_margin_pct).fold(0.0, f64::max);
    let hard_stop_days = windows.iter().map(|w| w.hard_stop_days).sum();
    let fallback_windows = windows.iter().filter(|w| w.status.is_fallback()).count();
    let monthly_returns = monthly_returns(&daily);

    tracing::info!(
        allocator,
        windows = windows.len(),
        days = daily.len(),
        final_equity = state.current_equity,
        cagr_pct = metrics.cagr_pct,
        sharpe = metrics.sharpe_ratio,
        max_drawdown_pct = metrics.max_drawdown_pct,
        fallback_windows,
        hard_stop_days,
        "Walk-forward run complete"
    );

    WalkForwardResult {
        allocator: allocator.to_string(),
        strategy_ids: aligned.strategy_ids.clone(),
        windows,
        daily,
        metrics,
        initial_capital: config.initial_capital,
        final_equity: state.current_equity,
        avg_in_sample_cagr_pct: avg_is,
        avg_out_of_sample_cagr_pct: avg_oos,
        overfitting_ratio,
        peak_margin_pct,
        hard_stop_days,
        fallback_windows,
        monthly_returns,
    }
}

/// Compounded return per calendar month of the out-of-sample curve.
pub fn monthly_returns(daily: &[DailyRecord]) -> Vec<MonthlyReturn> {
    let mut growth: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for record in daily {
        let key = (record.date.year(), record.date.month());
        *growth.entry(key).or_insert(1.0) *= 1.0 + record.daily_return;
    }
    growth
        .into_iter()
        .map(|((year, month), g)| MonthlyReturn {
            year,
            month,
            return_pct: (g - 1.0) * 100.0,
        })
        .collect()
}

/// Annualization factor for a number of trading days.
pub fn years_covered(days: usize) -> f64 {
    days as f64 / TRADING_DAYS_PER_YEAR
}
