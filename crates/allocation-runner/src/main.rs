mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use allocation_core::{Allocator, StrategiesData};
use walk_forward_engine::{ReportWriter, RunRecord, WalkForwardEngine};

use config::RunnerConfig;

/// Input document: `{"strategies": {"id": {"dates": [...], "returns": [...], ...}}}`.
#[derive(Debug, Deserialize)]
struct StrategiesDocument {
    strategies: StrategiesData,
}

fn load_strategies(path: &Path) -> Result<StrategiesData> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read strategies file {}", path.display()))?;
    let doc: StrategiesDocument = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse strategies file {}", path.display()))?;
    Ok(doc.strategies)
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = RunnerConfig::from_env()?;
    let strategies_path: PathBuf = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| config.strategies_file.clone())
        .context("No strategies file given (pass a path or set STRATEGIES_FILE)")?;

    tracing::info!(
        allocator = ?config.allocator,
        max_leverage = config.allocator_config.max_leverage,
        train_days = config.walk_forward.train_days,
        test_days = config.walk_forward.test_days,
        mode = ?config.walk_forward.walk_forward_type,
        "Configuration loaded"
    );

    let strategies = load_strategies(&strategies_path)?;
    tracing::info!(
        path = %strategies_path.display(),
        strategies = strategies.len(),
        "Loaded strategy data"
    );

    let allocator = config.build_allocator()?;
    let allocator_snapshot = allocator.config_snapshot();
    let mut engine = WalkForwardEngine::new(config.walk_forward.clone(), Box::new(allocator))
        .context("Failed to create walk-forward engine")?;

    let aligned = engine.align(&strategies);
    let result = engine
        .run_aligned(&aligned)
        .context("Walk-forward run failed")?;

    let record = RunRecord::new(
        &config.run_name,
        allocator_snapshot,
        &config.walk_forward,
        &aligned,
    );
    let artifacts = ReportWriter::new(&config.output_dir)
        .write_all(&record, &result, &aligned)
        .context("Failed to write run artifacts")?;

    tracing::info!(
        final_equity = result.final_equity,
        cagr_pct = result.metrics.cagr_pct,
        sharpe = result.metrics.sharpe_ratio,
        max_drawdown_pct = result.metrics.max_drawdown_pct,
        windows = result.windows.len(),
        fallback_windows = result.fallback_windows,
        overfitting_ratio = ?result.overfitting_ratio,
        "Run complete"
    );
    for path in artifacts.paths() {
        tracing::info!("  wrote {}", path.display());
    }

    Ok(())
}
