use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use portfolio_optimizer::correlation_matrix;

use crate::aligner::AlignedMatrix;
use crate::error::Result;
use crate::models::{WalkForwardConfig, WalkForwardResult};
use crate::tear_sheet::render_tear_sheet_html;

/// Configuration of one run, persisted next to its results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_name: String,
    pub created_at: String,
    pub allocator: serde_json::Value,
    pub walk_forward: WalkForwardConfig,
    pub strategies: Vec<String>,
    pub calendar_start: Option<NaiveDate>,
    pub calendar_end: Option<NaiveDate>,
    pub calendar_days: usize,
}

impl RunRecord {
    pub fn new(
        run_name: &str,
        allocator: serde_json::Value,
        walk_forward: &WalkForwardConfig,
        aligned: &AlignedMatrix,
    ) -> Self {
        Self {
            run_name: run_name.to_string(),
            created_at: Local::now().to_rfc3339(),
            allocator,
            walk_forward: walk_forward.clone(),
            strategies: aligned.strategy_ids.clone(),
            calendar_start: aligned.dates.first().copied(),
            calendar_end: aligned.dates.last().copied(),
            calendar_days: aligned.len(),
        }
    }
}

/// Paths written for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunArtifacts {
    pub base_name: String,
    pub config: PathBuf,
    pub daily: PathBuf,
    pub windows: PathBuf,
    pub correlation: PathBuf,
    pub tear_sheet: PathBuf,
}

impl RunArtifacts {
    pub fn paths(&self) -> [&Path; 5] {
        [
            self.config.as_path(),
            self.daily.as_path(),
            self.windows.as_path(),
            self.correlation.as_path(),
            self.tear_sheet.as_path(),
        ]
    }
}

/// `{run_name}_{YYYYmmdd_HHMMSS}`.
pub fn base_name(run_name: &str, at: DateTime<Local>) -> String {
    format!("{}_{}", run_name, at.format("%Y%m%d_%H%M%S"))
}

#[derive(Serialize)]
struct WindowRow<'a> {
    window: usize,
    train_start: NaiveDate,
    train_end: NaiveDate,
    test_start: NaiveDate,
    test_end: NaiveDate,
    status: &'a str,
    raw_allocations: String,
    final_allocations: String,
    margin_scale: f64,
    drawdown_scale: f64,
    hard_stop_days: usize,
    start_equity: f64,
    end_equity: f64,
    peak_margin_pct: f64,
    avg_margin_pct: f64,
    is_cagr_pct: f64,
    is_sharpe: f64,
    is_max_drawdown_pct: f64,
    is_volatility_pct: f64,
    oos_cagr_pct: f64,
    oos_sharpe: f64,
    oos_max_drawdown_pct: f64,
    oos_volatility_pct: f64,
}

pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn write_all(
        &self,
        record: &RunRecord,
        result: &WalkForwardResult,
        aligned: &AlignedMatrix,
    ) -> Result<RunArtifacts> {
        let base = base_name(&record.run_name, Local::now());
        self.write_with_base_name(&base, record, result, aligned)
    }

    pub fn write_with_base_name(
        &self,
        base: &str,
        record: &RunRecord,
        result: &WalkForwardResult,
        aligned: &AlignedMatrix,
    ) -> Result<RunArtifacts> {
        std::fs::create_dir_all(&self.dir)?;
        let path = |suffix: &str| self.dir.join(format!("{}_{}", base, suffix));

        let artifacts = RunArtifacts {
            base_name: base.to_string(),
            config: path("config.json"),
            daily: path("daily.csv"),
            windows: path("windows.csv"),
            correlation: path("correlation.csv"),
            tear_sheet: path("tearsheet.html"),
        };

        std::fs::write(&artifacts.config, serde_json::to_string_pretty(record)?)?;
        write_daily(&artifacts.daily, result)?;
        write_windows(&artifacts.windows, result)?;
        write_correlation(&artifacts.correlation, aligned)?;
        std::fs::write(
            &artifacts.tear_sheet,
            render_tear_sheet_html(result, &record.run_name),
        )?;

        tracing::info!(dir = %self.dir.display(), base = %base, "Wrote run artifacts");
        Ok(artifacts)
    }
}

fn write_daily(path: &Path, result: &WalkForwardResult) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in &result.daily {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn format_allocations<'a>(allocations: impl IntoIterator<Item = (&'a String, &'a f64)>) -> String {
    allocations
        .into_iter()
        .map(|(id, pct)| format!("{}:{:.2}", id, pct))
        .collect::<Vec<_>>()
        .join(";")
}

fn write_windows(path: &Path, result: &WalkForwardResult) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for w in &result.windows {
        writer.serialize(WindowRow {
            window: w.bounds.index,
            train_start: w.train_start_date,
            train_end: w.train_end_date,
            test_start: w.test_start_date,
            test_end: w.test_end_date,
            status: w.status.label(),
            raw_allocations: format_allocations(&w.raw_allocations),
            final_allocations: format_allocations(&w.final_allocations),
            margin_scale: w.margin_scale,
            drawdown_scale: w.drawdown_scale,
            hard_stop_days: w.hard_stop_days,
            start_equity: w.start_equity,
            end_equity: w.end_equity,
            peak_margin_pct: w.peak_margin_pct,
            avg_margin_pct: w.avg_margin_pct,
            is_cagr_pct: w.in_sample.cagr_pct,
            is_sharpe: w.in_sample.sharpe_ratio,
            is_max_drawdown_pct: w.in_sample.max_drawdown_pct,
            is_volatility_pct: w.in_sample.annual_volatility_pct,
            oos_cagr_pct: w.out_of_sample.cagr_pct,
            oos_sharpe: w.out_of_sample.sharpe_ratio,
            oos_max_drawdown_pct: w.out_of_sample.max_drawdown_pct,
            oos_volatility_pct: w.out_of_sample.annual_volatility_pct,
        })?;
    }
    writer.flush()?;
    Ok(())
}

fn write_correlation(path: &Path, aligned: &AlignedMatrix) -> Result<()> {
    let corr = correlation_matrix(&aligned.returns);
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec!["strategy".to_string()];
    header.extend(aligned.strategy_ids.iter().cloned());
    writer.write_record(&header)?;

    for (i, id) in aligned.strategy_ids.iter().enumerate() {
        let mut row = vec![id.clone()];
        row.extend((0..aligned.n_strategies()).map(|j| format!("{:.6}", corr[(i, j)])));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_base_name_format() {
        let at = Local.with_ymd_and_hms(2024, 5, 17, 9, 3, 7).unwrap();
        assert_eq!(base_name("hybrid_run", at), "hybrid_run_20240517_090307");
    }

    #[test]
    fn test_format_allocations() {
        let map: allocation_core::AllocationMap =
            [("a".to_string(), 12.3456), ("b".to_string(), 50.0)].into_iter().collect();
        assert_eq!(format_allocations(&map), "a:12.35;b:50.00");
    }
}
