use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use portfolio_optimizer::{AllocatorConfig, PortfolioAllocator};
use walk_forward_engine::{WalkForwardConfig, WalkForwardType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocatorKind {
    MaxSharpe,
    MaxCagr,
    Hybrid,
}

impl FromStr for AllocatorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "max_sharpe" | "sharpe" => Ok(AllocatorKind::MaxSharpe),
            "max_cagr" | "cagr" => Ok(AllocatorKind::MaxCagr),
            "hybrid" => Ok(AllocatorKind::Hybrid),
            other => bail!(
                "unknown allocator '{}', expected max_sharpe, max_cagr or hybrid",
                other
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// JSON document `{"strategies": {...}}`; may also come from the first CLI argument.
    pub strategies_file: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub run_name: String,

    // Allocator
    pub allocator: AllocatorKind,
    pub allocator_config: AllocatorConfig,
    pub min_sharpe: f64,             // max_cagr only
    pub max_drawdown_limit: f64,     // max_cagr and hybrid
    pub hybrid_alpha: f64,
    pub cagr_target: f64,
    pub cached_allocations_file: Option<PathBuf>, // hybrid only

    // Walk-forward
    pub walk_forward: WalkForwardConfig,
}

impl RunnerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = AllocatorConfig::default();
        let wf_defaults = WalkForwardConfig::default();

        let config = Self {
            strategies_file: lookup("STRATEGIES_FILE").map(PathBuf::from),
            output_dir: lookup("OUTPUT_DIR")
                .unwrap_or_else(|| "./output".to_string())
                .into(),
            run_name: lookup("RUN_NAME").unwrap_or_else(|| "walk_forward".to_string()),

            allocator: lookup("ALLOCATOR")
                .unwrap_or_else(|| "hybrid".to_string())
                .parse()?,
            allocator_config: AllocatorConfig {
                max_leverage: parse_or(&lookup, "MAX_LEVERAGE", defaults.max_leverage)?,
                max_single_strategy: parse_or(
                    &lookup,
                    "MAX_SINGLE_STRATEGY",
                    defaults.max_single_strategy,
                )?,
                min_allocation: parse_or(&lookup, "MIN_ALLOCATION", defaults.min_allocation)?,
                risk_free_rate: parse_or(&lookup, "RISK_FREE_RATE", defaults.risk_free_rate)?,
                ..defaults
            },
            min_sharpe: parse_or(&lookup, "MIN_SHARPE", 1.0)?,
            max_drawdown_limit: parse_or(&lookup, "MAX_DRAWDOWN_LIMIT", -0.25)?,
            hybrid_alpha: parse_or(&lookup, "HYBRID_ALPHA", 0.5)?,
            cagr_target: parse_or(&lookup, "CAGR_TARGET", 0.5)?,
            cached_allocations_file: lookup("CACHED_ALLOCATIONS_FILE")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),

            walk_forward: WalkForwardConfig {
                train_days: parse_or(&lookup, "TRAIN_DAYS", wf_defaults.train_days)?,
                test_days: parse_or(&lookup, "TEST_DAYS", wf_defaults.test_days)?,
                walk_forward_type: lookup("WALK_FORWARD_TYPE")
                    .map(|s| s.parse::<WalkForwardType>())
                    .transpose()
                    .context("Invalid WALK_FORWARD_TYPE")?
                    .unwrap_or(wf_defaults.walk_forward_type),
                apply_drawdown_protection: parse_or(
                    &lookup,
                    "DRAWDOWN_PROTECTION",
                    wf_defaults.apply_drawdown_protection,
                )?,
                max_drawdown_threshold: parse_or(
                    &lookup,
                    "MAX_DRAWDOWN_THRESHOLD",
                    wf_defaults.max_drawdown_threshold,
                )?,
                initial_capital: parse_or(&lookup, "INITIAL_CAPITAL", wf_defaults.initial_capital)?,
                ..wf_defaults
            },
        };

        config.allocator_config.validate().context("Invalid allocator configuration")?;
        config.walk_forward.validate().context("Invalid walk-forward configuration")?;
        Ok(config)
    }

    pub fn build_allocator(&self) -> Result<PortfolioAllocator> {
        let cfg = self.allocator_config.clone();
        let allocator = match self.allocator {
            AllocatorKind::MaxSharpe => PortfolioAllocator::max_sharpe(cfg)?,
            AllocatorKind::MaxCagr => {
                PortfolioAllocator::max_cagr(cfg, self.min_sharpe, self.max_drawdown_limit)?
            }
            AllocatorKind::Hybrid => {
                let allocator = PortfolioAllocator::hybrid(
                    cfg,
                    self.hybrid_alpha,
                    self.cagr_target,
                    self.max_drawdown_limit,
                )?;
                match &self.cached_allocations_file {
                    Some(path) => allocator.with_cached_allocations(path),
                    None => allocator,
                }
            }
        };
        Ok(allocator)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}
