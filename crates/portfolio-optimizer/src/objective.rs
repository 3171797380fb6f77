use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use allocation_core::metrics::{self, TRADING_DAYS_PER_YEAR};

use crate::solver::{Constraint, Objective};
use crate::stats::ReturnStatistics;

/// What the allocator optimizes. Each variant contributes an objective and a
/// set of inequality constraints to the shared solve pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AllocationObjective {
    /// Maximize the daily Sharpe ratio of the portfolio.
    #[default]
    MaxSharpe,
    /// Maximize CAGR subject to an annualized Sharpe floor and a drawdown floor.
    MaxCagrWithSharpeFloor {
        #[serde(default = "default_min_sharpe")]
        min_sharpe: f64,
        #[serde(default = "default_max_drawdown_limit")]
        max_drawdown_limit: f64,
    },
    /// Maximize `alpha * sharpe + (1 - alpha) * cagr / cagr_target`
    /// subject to a drawdown floor.
    Hybrid {
        #[serde(default = "default_alpha")]
        alpha: f64,
        #[serde(default = "default_cagr_target")]
        cagr_target: f64,
        #[serde(default = "default_max_drawdown_limit")]
        max_drawdown_limit: f64,
    },
}

fn default_min_sharpe() -> f64 {
    1.0
}

fn default_max_drawdown_limit() -> f64 {
    -0.25
}

fn default_alpha() -> f64 {
    0.5
}

fn default_cagr_target() -> f64 {
    0.5
}

impl AllocationObjective {
    pub fn max_cagr() -> Self {
        AllocationObjective::MaxCagrWithSharpeFloor {
            min_sharpe: default_min_sharpe(),
            max_drawdown_limit: default_max_drawdown_limit(),
        }
    }

    pub fn hybrid() -> Self {
        AllocationObjective::Hybrid {
            alpha: default_alpha(),
            cagr_target: default_cagr_target(),
            max_drawdown_limit: default_max_drawdown_limit(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AllocationObjective::MaxSharpe => "max_sharpe",
            AllocationObjective::MaxCagrWithSharpeFloor { .. } => "max_cagr_sharpe_floor",
            AllocationObjective::Hybrid { .. } => "hybrid",
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match *self {
            AllocationObjective::MaxSharpe => Ok(()),
            AllocationObjective::MaxCagrWithSharpeFloor {
                min_sharpe,
                max_drawdown_limit,
            } => {
                if !min_sharpe.is_finite() {
                    return Err("min_sharpe must be finite".to_string());
                }
                check_drawdown_limit(max_drawdown_limit)
            }
            AllocationObjective::Hybrid {
                alpha,
                cagr_target,
                max_drawdown_limit,
            } => {
                if !(0.0..=1.0).contains(&alpha) {
                    return Err(format!("alpha must be within [0, 1], got {}", alpha));
                }
                if !cagr_target.is_finite() || cagr_target < 0.0 {
                    return Err(format!("cagr_target must be >= 0, got {}", cagr_target));
                }
                check_drawdown_limit(max_drawdown_limit)
            }
        }
    }

    /// Objective to minimize over the weight vector.
    pub fn objective<'a>(&self, stats: &'a ReturnStatistics, risk_free_rate: f64) -> Objective<'a> {
        match *self {
            AllocationObjective::MaxSharpe => {
                Box::new(move |w: &DVector<f64>| -daily_sharpe(stats, w, risk_free_rate))
            }
            AllocationObjective::MaxCagrWithSharpeFloor { .. } => {
                Box::new(move |w: &DVector<f64>| -metrics::cagr(&stats.portfolio_returns(w)))
            }
            AllocationObjective::Hybrid {
                alpha, cagr_target, ..
            } => Box::new(move |w: &DVector<f64>| {
                let sharpe = daily_sharpe(stats, w, risk_free_rate);
                let cagr = metrics::cagr(&stats.portfolio_returns(w));
                let normalized = if cagr_target > 0.0 {
                    cagr / cagr_target
                } else {
                    cagr
                };
                -(alpha * sharpe + (1.0 - alpha) * normalized)
            }),
        }
    }

    /// Inequality constraints, each satisfied when `>= 0`.
    pub fn constraints<'a>(
        &self,
        stats: &'a ReturnStatistics,
        risk_free_rate: f64,
    ) -> Vec<Constraint<'a>> {
        match *self {
            AllocationObjective::MaxSharpe => Vec::new(),
            AllocationObjective::MaxCagrWithSharpeFloor {
                min_sharpe,
                max_drawdown_limit,
            } => {
                let sharpe_floor: Constraint<'a> = Box::new(move |w: &DVector<f64>| {
                    if stats.portfolio_std(w) == 0.0 {
                        return f64::NEG_INFINITY;
                    }
                    daily_sharpe(stats, w, risk_free_rate) * TRADING_DAYS_PER_YEAR.sqrt()
                        - min_sharpe
                });
                vec![sharpe_floor, drawdown_floor(stats, max_drawdown_limit)]
            }
            AllocationObjective::Hybrid {
                max_drawdown_limit,
                ..
            } => vec![drawdown_floor(stats, max_drawdown_limit)],
        }
    }
}

fn check_drawdown_limit(limit: f64) -> Result<(), String> {
    if limit.is_finite() && (-1.0..=0.0).contains(&limit) {
        Ok(())
    } else {
        Err(format!("max_drawdown_limit must be within [-1, 0], got {}", limit))
    }
}

fn drawdown_floor(stats: &ReturnStatistics, limit: f64) -> Constraint<'_> {
    Box::new(move |w: &DVector<f64>| metrics::max_drawdown(&stats.portfolio_returns(w)) - limit)
}

/// `(w . mu - rf) / sqrt(w' S w)`, zero when the portfolio has no variance.
pub fn daily_sharpe(stats: &ReturnStatistics, weights: &DVector<f64>, risk_free_rate: f64) -> f64 {
    let std = stats.portfolio_std(weights);
    if std == 0.0 {
        return 0.0;
    }
    (stats.portfolio_mean(weights) - risk_free_rate) / std
}

#[cfg(test)]
mod tests {
    use super::*;
    use allocation_core::{HistorySet, StrategyHistory};

    fn stats() -> ReturnStatistics {
        let mut h = HistorySet::new();
        h.insert(
            "a".to_string(),
            StrategyHistory::new(vec![0.01, -0.02, 0.015, 0.005, -0.01, 0.02]),
        );
        h.insert(
            "b".to_string(),
            StrategyHistory::new(vec![0.002, 0.001, -0.001, 0.003, 0.002, 0.0]),
        );
        ReturnStatistics::estimate(&h).unwrap()
    }

    #[test]
    fn test_daily_sharpe_zero_weights() {
        let s = stats();
        assert_eq!(daily_sharpe(&s, &DVector::zeros(2), 0.0), 0.0);
    }

    #[test]
    fn test_sharpe_objective_is_negated_sharpe() {
        let s = stats();
        let w = DVector::from_vec(vec![0.5, 0.5]);
        let f = AllocationObjective::MaxSharpe.objective(&s, 0.0);
        assert!((f(&w) + daily_sharpe(&s, &w, 0.0)).abs() < 1e-12);
    }

    #[test]
    fn test_sharpe_floor_violated_without_variance() {
        let s = stats();
        let constraints = AllocationObjective::max_cagr().constraints(&s, 0.0);
        assert_eq!(constraints.len(), 2);
        assert_eq!(constraints[0](&DVector::zeros(2)), f64::NEG_INFINITY);
    }

    #[test]
    fn test_hybrid_has_only_drawdown_constraint() {
        let s = stats();
        let constraints = AllocationObjective::hybrid().constraints(&s, 0.0);
        assert_eq!(constraints.len(), 1);
        // Zero exposure never draws down.
        assert!((constraints[0](&DVector::zeros(2)) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_hybrid_blends_sharpe_and_normalized_cagr() {
        let s = stats();
        let w = DVector::from_vec(vec![0.6, 0.8]);
        let objective = AllocationObjective::Hybrid {
            alpha: 0.5,
            cagr_target: 0.4,
            max_drawdown_limit: -0.25,
        };
        let f = objective.objective(&s, 0.0);
        let sharpe = daily_sharpe(&s, &w, 0.0);
        let cagr = metrics::cagr(&s.portfolio_returns(&w));
        let expected = 0.5 * sharpe + 0.5 * cagr / 0.4;
        assert!((f(&w) + expected).abs() < 1e-12);
        // Both terms contribute.
        assert!(sharpe.abs() > 1e-6 && cagr.abs() > 1e-6);
    }

    #[test]
    fn test_hybrid_zero_target_uses_raw_cagr() {
        let s = stats();
        let w = DVector::from_vec(vec![0.0, 1.0]);
        let objective = AllocationObjective::Hybrid {
            alpha: 0.0,
            cagr_target: 0.0,
            max_drawdown_limit: -0.25,
        };
        let f = objective.objective(&s, 0.0);
        let cagr = metrics::cagr(&s.portfolio_returns(&w));
        assert!((f(&w) + cagr).abs() < 1e-12);
    }

    #[test]
    fn test_validate() {
        assert!(AllocationObjective::hybrid().validate().is_ok());
        let bad = AllocationObjective::Hybrid {
            alpha: 1.5,
            cagr_target: 0.5,
            max_drawdown_limit: -0.25,
        };
        assert!(bad.validate().is_err());
        let bad_limit = AllocationObjective::MaxCagrWithSharpeFloor {
            min_sharpe: 1.0,
            max_drawdown_limit: 0.3,
        };
        assert!(bad_limit.validate().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let obj: AllocationObjective =
            serde_json::from_str(r#"{"type": "hybrid", "alpha": 0.7}"#).unwrap();
        assert_eq!(
            obj,
            AllocationObjective::Hybrid {
                alpha: 0.7,
                cagr_target: 0.5,
                max_drawdown_limit: -0.25
            }
        );
    }
}
