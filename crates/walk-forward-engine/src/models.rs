use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use allocation_core::{AllocationMap, AllocationStatus, PerformanceMetrics};

use crate::aligner::DEFAULT_ACCOUNT_EQUITY;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkForwardType {
    /// Training window grows from the start of the calendar.
    Anchored,
    /// Training window keeps a fixed width of `train_days`.
    #[default]
    Rolling,
}

impl std::str::FromStr for WalkForwardType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anchored" => Ok(WalkForwardType::Anchored),
            "rolling" => Ok(WalkForwardType::Rolling),
            other => Err(EngineError::InvalidConfig(format!(
                "unknown walk-forward type '{}', expected anchored or rolling",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    pub train_days: usize,
    pub test_days: usize,
    pub walk_forward_type: WalkForwardType,
    pub apply_drawdown_protection: bool,
    /// Drawdown from peak (fraction) that triggers de-leveraging.
    pub max_drawdown_threshold: f64,
    pub initial_capital: f64,
    /// Fraction of `max_leverage` that daily margin may use.
    pub margin_safety_factor: f64,
    pub default_account_equity: f64,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            train_days: 252,
            test_days: 63,
            walk_forward_type: WalkForwardType::Rolling,
            apply_drawdown_protection: true,
            max_drawdown_threshold: 0.20,
            initial_capital: 100_000.0,
            margin_safety_factor: 0.8,
            default_account_equity: DEFAULT_ACCOUNT_EQUITY,
        }
    }
}

impl WalkForwardConfig {
    pub fn validate(&self) -> Result<()> {
        if self.train_days == 0 || self.test_days == 0 {
            return Err(EngineError::InvalidConfig(format!(
                "train_days and test_days must be positive, got {} and {}",
                self.train_days, self.test_days
            )));
        }
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            )));
        }
        if !(self.max_drawdown_threshold > 0.0 && self.max_drawdown_threshold <= 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "max_drawdown_threshold must be within (0, 1], got {}",
                self.max_drawdown_threshold
            )));
        }
        if !(self.margin_safety_factor > 0.0 && self.margin_safety_factor <= 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "margin_safety_factor must be within (0, 1], got {}",
                self.margin_safety_factor
            )));
        }
        if !self.default_account_equity.is_finite() || self.default_account_equity <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "default_account_equity must be positive, got {}",
                self.default_account_equity
            )));
        }
        Ok(())
    }

    /// Train/test row ranges for a calendar of `len` days. Test ranges are
    /// contiguous and non-overlapping; a trailing partial window is dropped.
    pub fn windows(&self, len: usize) -> Vec<WindowBounds> {
        let mut windows = Vec::new();
        if self.train_days == 0 || self.test_days == 0 {
            return windows;
        }
        let mut test_start = self.train_days;
        while test_start + self.test_days <= len {
            let train_start = match self.walk_forward_type {
                WalkForwardType::Anchored => 0,
                WalkForwardType::Rolling => test_start.saturating_sub(self.train_days),
            };
            windows.push(WindowBounds {
                index: windows.len(),
                train_start,
                train_end: test_start,
                test_start,
                test_end: test_start + self.test_days,
            });
            test_start += self.test_days;
        }
        windows
    }
}

/// Calendar row ranges of one window; ends are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub index: usize,
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
}

impl WindowBounds {
    pub fn train_len(&self) -> usize {
        self.train_end - self.train_start
    }

    pub fn test_len(&self) -> usize {
        self.test_end - self.test_start
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowResult {
    pub bounds: WindowBounds,
    pub train_start_date: NaiveDate,
    pub train_end_date: NaiveDate,
    pub test_start_date: NaiveDate,
    pub test_end_date: NaiveDate,
    /// Allocator output before any post-scaling.
    pub raw_allocations: AllocationMap,
    /// Allocations actually applied (percent of equity).
    pub final_allocations: AllocationMap,
    pub status: AllocationStatus,
    pub margin_scale: f64,
    pub drawdown_scale: f64,
    pub hard_stop_days: usize,
    pub start_equity: f64,
    pub end_equity: f64,
    pub peak_margin_pct: f64,
    pub avg_margin_pct: f64,
    pub returns: Vec<f64>,
    pub margin_used: Vec<f64>,
    pub notional: Vec<f64>,
    pub in_sample: PerformanceMetrics,
    pub out_of_sample: PerformanceMetrics,
}

/// One simulated out-of-sample day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub window: usize,
    pub daily_return: f64,
    pub equity: f64,
    pub peak_equity: f64,
    pub drawdown_pct: f64,
    /// Margin in currency, from the margin fraction and the day's starting equity.
    pub margin_used: f64,
    pub margin_pct: f64,
    pub notional: f64,
    /// 0 on hard-stop days, else 1.
    pub leverage_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyReturn {
    pub year: i32,
    pub month: u32,
    pub return_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub allocator: String,
    pub strategy_ids: Vec<String>,
    pub windows: Vec<WindowResult>,
    pub daily: Vec<DailyRecord>,
    /// Metrics over the concatenated out-of-sample curve.
    pub metrics: PerformanceMetrics,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub avg_in_sample_cagr_pct: f64,
    pub avg_out_of_sample_cagr_pct: f64,
    /// Average in-sample over out-of-sample CAGR; `None` when out-of-sample
    /// CAGR is too close to zero.
    pub overfitting_ratio: Option<f64>,
    pub peak_margin_pct: f64,
    pub hard_stop_days: usize,
    pub fallback_windows: usize,
    pub monthly_returns: Vec<MonthlyReturn>,
}

impl WalkForwardResult {
    pub fn daily_returns(&self) -> Vec<f64> {
        self.daily.iter().map(|d| d.daily_return).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(WalkForwardConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_test = WalkForwardConfig {
            test_days: 0,
            ..Default::default()
        };
        assert!(zero_test.validate().is_err());
        let bad_threshold = WalkForwardConfig {
            max_drawdown_threshold: 1.5,
            ..Default::default()
        };
        assert!(bad_threshold.validate().is_err());
        let bad_capital = WalkForwardConfig {
            initial_capital: -1.0,
            ..Default::default()
        };
        assert!(bad_capital.validate().is_err());
    }

    #[test]
    fn test_walk_forward_type_parsing() {
        assert_eq!("Anchored".parse::<WalkForwardType>().unwrap(), WalkForwardType::Anchored);
        assert_eq!("rolling".parse::<WalkForwardType>().unwrap(), WalkForwardType::Rolling);
        assert!("expanding".parse::<WalkForwardType>().is_err());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let raw = r#"{"train_days": 100, "walk_forward_type": "anchored"}"#;
        let cfg: WalkForwardConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.train_days, 100);
        assert_eq!(cfg.test_days, 63);
        assert_eq!(cfg.walk_forward_type, WalkForwardType::Anchored);
    }
}
