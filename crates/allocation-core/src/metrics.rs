//! Return-series metrics shared by the optimizers and the walk-forward driver.
//! Pure functions over daily fractional returns; degenerate inputs yield zero.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Standard deviations below this are treated as zero volatility.
pub const MIN_STD_DEV: f64 = 1e-12;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return_pct: f64,
    pub cagr_pct: f64,
    pub sharpe_ratio: f64,
    /// Worst peak-to-trough decline, negative (e.g. -12.5).
    pub max_drawdown_pct: f64,
    pub annual_volatility_pct: f64,
}

impl PerformanceMetrics {
    pub fn from_returns(returns: &[f64]) -> Self {
        Self {
            total_return_pct: (compound_growth(returns) - 1.0) * 100.0,
            cagr_pct: cagr(returns) * 100.0,
            sharpe_ratio: sharpe_ratio(returns),
            max_drawdown_pct: max_drawdown(returns) * 100.0,
            annual_volatility_pct: annual_volatility(returns) * 100.0,
        }
    }
}

/// Product of `(1 + r)`.
pub fn compound_growth(returns: &[f64]) -> f64 {
    returns.iter().fold(1.0, |acc, r| acc * (1.0 + r))
}

/// `(prod(1+r))^(252/n) - 1`. Zero for an empty series, -1 once the path
/// has lost everything.
pub fn cagr(returns: &[f64]) -> f64 {
    let n_years = returns.len() as f64 / TRADING_DAYS_PER_YEAR;
    if n_years <= 0.0 {
        return 0.0;
    }
    let growth = compound_growth(returns);
    if !growth.is_finite() {
        return 0.0;
    }
    if growth <= 0.0 {
        return -1.0;
    }
    growth.powf(1.0 / n_years) - 1.0
}

pub fn mean(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.mean()
}

/// Population standard deviation; zero for fewer than two observations.
pub fn std_dev(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let sd = returns.population_std_dev();
    if sd.is_finite() && sd > MIN_STD_DEV {
        sd
    } else {
        0.0
    }
}

/// Annualized Sharpe: `mean/std * sqrt(252)`, zero when volatility is zero.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    let sd = std_dev(returns);
    if sd == 0.0 {
        return 0.0;
    }
    mean(returns) / sd * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Minimum of `(cum - running_max) / running_max` over the compounded path.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut cum = 1.0;
    let mut running_max = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for r in returns {
        cum *= 1.0 + r;
        if cum > running_max {
            running_max = cum;
        }
        if running_max > 0.0 {
            let dd = (cum - running_max) / running_max;
            if dd < worst {
                worst = dd;
            }
        }
    }
    worst
}

pub fn annual_volatility(returns: &[f64]) -> f64 {
    std_dev(returns) * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Peak-relative drawdown as a positive fraction; zero for a non-positive peak.
pub fn drawdown_from_peak(peak: f64, equity: f64) -> f64 {
    if peak > 0.0 && peak.is_finite() && equity.is_finite() {
        ((peak - equity) / peak).max(0.0)
    } else {
        0.0
    }
}
