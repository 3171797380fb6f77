use std::ops::Range;

use crate::aligner::AlignedMatrix;

/// Weighted portfolio margin for calendar row `day`, as a fraction of equity.
///
/// Each strategy's margin is normalized by its own account equity before
/// weighting. Strategies without an equity series fall back to
/// `margin / initial_capital`, which is less accurate.
pub fn portfolio_margin_fraction(
    aligned: &AlignedMatrix,
    day: usize,
    weights: &[f64],
    initial_capital: f64,
) -> f64 {
    let mut total = 0.0;
    for (col, &w) in weights.iter().enumerate() {
        if w == 0.0 || !aligned.has_margin[col] {
            continue;
        }
        let margin = aligned.margin[(day, col)];
        let denominator = if aligned.has_account_equity[col] {
            aligned.account_equity[(day, col)]
        } else {
            initial_capital
        };
        if denominator > 0.0 && denominator.is_finite() {
            total += w * margin / denominator;
        }
    }
    if total.is_finite() {
        total
    } else {
        0.0
    }
}

/// Uniform scale that keeps every day's margin within
/// `max_leverage * safety_factor` of equity. Returns 1.0 when no strategy
/// has margin data or the cap already holds.
pub fn margin_scale_factor(
    aligned: &AlignedMatrix,
    days: Range<usize>,
    weights: &[f64],
    initial_capital: f64,
    max_leverage: f64,
    safety_factor: f64,
) -> f64 {
    if !aligned.any_margin() {
        return 1.0;
    }
    let max_used = days
        .map(|day| portfolio_margin_fraction(aligned, day, weights, initial_capital))
        .fold(0.0, f64::max);
    let max_allowed = max_leverage * safety_factor;
    if max_used > max_allowed && max_used > 0.0 {
        max_allowed / max_used
    } else {
        1.0
    }
}

/// Tracks margin utilization over one test window.
#[derive(Debug, Default, Clone)]
pub struct MarginTracker {
    peak_fraction: f64,
    sum_fraction: f64,
    days: usize,
}

impl MarginTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, fraction: f64) {
        if !fraction.is_finite() {
            return;
        }
        self.peak_fraction = self.peak_fraction.max(fraction);
        self.sum_fraction += fraction;
        self.days += 1;
    }

    /// Peak utilization in percent of equity.
    pub fn peak_pct(&self) -> f64 {
        self.peak_fraction * 100.0
    }

    pub fn average_pct(&self) -> f64 {
        if self.days == 0 {
            0.0
        } else {
            self.sum_fraction / self.days as f64 * 100.0
        }
    }
}
