//! Builds the master trading calendar and the per-strategy matrices that the
//! walk-forward driver slices into windows.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use chrono::NaiveDate;
use nalgebra::DMatrix;

use allocation_core::{HistorySet, StrategiesData, StrategyHistory};

/// Equity assumed for a strategy on dates before its first equity observation
/// (or for all dates when it supplies none).
pub const DEFAULT_ACCOUNT_EQUITY: f64 = 100_000.0;

/// Date-indexed matrices (rows = calendar days, columns = strategies).
///
/// Returns, margin and notional are zero where a strategy has no
/// observation; account equity is forward-filled, then defaulted.
#[derive(Debug, Clone)]
pub struct AlignedMatrix {
    pub dates: Vec<NaiveDate>,
    pub strategy_ids: Vec<String>,
    pub returns: DMatrix<f64>,
    pub margin: DMatrix<f64>,
    pub notional: DMatrix<f64>,
    pub account_equity: DMatrix<f64>,
    pub has_margin: Vec<bool>,
    pub has_notional: Vec<bool>,
    pub has_account_equity: Vec<bool>,
    /// Dates without a matching value because a value vector was shorter
    /// than the strategy's date vector.
    pub dropped_observations: usize,
    /// Non-finite inputs that were replaced by zero (or treated as missing
    /// for account equity).
    pub non_finite_replaced: usize,
}

impl AlignedMatrix {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() || self.strategy_ids.is_empty()
    }

    pub fn n_strategies(&self) -> usize {
        self.strategy_ids.len()
    }

    pub fn column_of(&self, strategy_id: &str) -> Option<usize> {
        self.strategy_ids.iter().position(|id| id == strategy_id)
    }

    /// Allocator input for the calendar rows in `rows`.
    pub fn history(&self, rows: Range<usize>) -> HistorySet {
        let rows = rows.start.min(self.len())..rows.end.min(self.len());
        self.strategy_ids
            .iter()
            .enumerate()
            .map(|(col, id)| {
                let returns = column_slice(&self.returns, col, &rows);
                let mut history = StrategyHistory::new(returns);
                if self.has_margin[col] {
                    history = history.with_margin(column_slice(&self.margin, col, &rows));
                }
                (id.clone(), history)
            })
            .collect()
    }

    pub fn any_margin(&self) -> bool {
        self.has_margin.iter().any(|&m| m)
    }
}

fn column_slice(matrix: &DMatrix<f64>, col: usize, rows: &Range<usize>) -> Vec<f64> {
    rows.clone().map(|row| matrix[(row, col)]).collect()
}

struct StrategyColumns {
    returns: BTreeMap<NaiveDate, f64>,
    margin: Option<BTreeMap<NaiveDate, f64>>,
    notional: Option<BTreeMap<NaiveDate, f64>>,
    account_equity: Option<BTreeMap<NaiveDate, f64>>,
}

/// Outer-join every strategy onto the union of their dates.
///
/// Strategies without any return observation are left out. The result is
/// empty when no strategy has return data.
pub fn align(strategies: &StrategiesData, default_account_equity: f64) -> AlignedMatrix {
    let mut dropped = 0usize;
    let mut non_finite = 0usize;

    let mut columns: Vec<(String, StrategyColumns)> = Vec::new();
    for (id, series) in strategies {
        let returns = index_by_date(&series.dates, &series.returns, &mut dropped);
        if returns.is_empty() {
            tracing::debug!(strategy = %id, "Strategy has no return data, skipping");
            continue;
        }
        if series.returns.len() != series.dates.len() {
            tracing::warn!(
                strategy = %id,
                dates = series.dates.len(),
                returns = series.returns.len(),
                "Return series length does not match dates"
            );
        }
        let margin = series
            .margin_used
            .as_ref()
            .map(|v| index_by_date(&series.dates, v, &mut dropped));
        let notional = series
            .notional
            .as_ref()
            .map(|v| index_by_date(&series.dates, v, &mut dropped));
        let account_equity = series
            .account_equity
            .as_ref()
            .map(|v| index_by_date(&series.dates, v, &mut dropped));
        columns.push((
            id.clone(),
            StrategyColumns {
                returns,
                margin,
                notional,
                account_equity,
            },
        ));
    }

    let calendar: Vec<NaiveDate> = columns
        .iter()
        .flat_map(|(_, c)| c.returns.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let rows = calendar.len();
    let cols = columns.len();
    let mut returns = DMatrix::zeros(rows, cols);
    let mut margin = DMatrix::zeros(rows, cols);
    let mut notional = DMatrix::zeros(rows, cols);
    let mut account_equity = DMatrix::from_element(rows, cols, default_account_equity);

    for (col, (_, c)) in columns.iter().enumerate() {
        fill_zeroed(&mut returns, col, &calendar, Some(&c.returns), &mut non_finite);
        fill_zeroed(&mut margin, col, &calendar, c.margin.as_ref(), &mut non_finite);
        fill_zeroed(&mut notional, col, &calendar, c.notional.as_ref(), &mut non_finite);

        if let Some(equity) = &c.account_equity {
            let mut last: Option<f64> = None;
            for (row, date) in calendar.iter().enumerate() {
                if let Some(&v) = equity.get(date) {
                    if v.is_finite() && v > 0.0 {
                        last = Some(v);
                    } else {
                        non_finite += usize::from(!v.is_finite());
                    }
                }
                account_equity[(row, col)] = last.unwrap_or(default_account_equity);
            }
        }
    }

    let aligned = AlignedMatrix {
        dates: calendar,
        strategy_ids: columns.iter().map(|(id, _)| id.clone()).collect(),
        returns,
        margin,
        notional,
        account_equity,
        has_margin: columns.iter().map(|(_, c)| c.margin.is_some()).collect(),
        has_notional: columns.iter().map(|(_, c)| c.notional.is_some()).collect(),
        has_account_equity: columns.iter().map(|(_, c)| c.account_equity.is_some()).collect(),
        dropped_observations: dropped,
        non_finite_replaced: non_finite,
    };

    tracing::info!(
        strategies = aligned.n_strategies(),
        days = aligned.len(),
        first = ?aligned.dates.first(),
        last = ?aligned.dates.last(),
        dropped = aligned.dropped_observations,
        non_finite = aligned.non_finite_replaced,
        "Aligned strategy data"
    );

    aligned
}

/// Later observations for the same date replace earlier ones.
fn index_by_date(
    dates: &[NaiveDate],
    values: &[f64],
    dropped: &mut usize,
) -> BTreeMap<NaiveDate, f64> {
    *dropped += dates.len().saturating_sub(values.len());
    dates.iter().copied().zip(values.iter().copied()).collect()
}

fn fill_zeroed(
    target: &mut DMatrix<f64>,
    col: usize,
    calendar: &[NaiveDate],
    values: Option<&BTreeMap<NaiveDate, f64>>,
    non_finite: &mut usize,
) {
    let Some(values) = values else {
        return;
    };
    for (row, date) in calendar.iter().enumerate() {
        if let Some(&v) = values.get(date) {
            if v.is_finite() {
                target[(row, col)] = v;
            } else {
                *non_finite += 1;
            }
        }
    }
}
