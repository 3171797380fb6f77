use nalgebra::{DMatrix, DVector};

use allocation_core::{AllocationError, HistorySet, Result};

/// Moments estimated from a set of strategy histories.
///
/// `means` uses each strategy's full history; `covariance` and
/// `aligned_returns` use only the most recent observations common to all
/// strategies (rows = days, columns = strategies, in `ids` order).
#[derive(Debug, Clone)]
pub struct ReturnStatistics {
    pub ids: Vec<String>,
    pub means: DVector<f64>,
    pub covariance: DMatrix<f64>,
    pub aligned_returns: DMatrix<f64>,
}

impl ReturnStatistics {
    pub fn estimate(history: &HistorySet) -> Result<Self> {
        let usable: Vec<(&String, &Vec<f64>)> = history
            .iter()
            .filter(|(_, h)| !h.returns.is_empty())
            .map(|(id, h)| (id, &h.returns))
            .collect();

        if usable.is_empty() {
            return Err(AllocationError::InsufficientData(
                "no strategy has return history".to_string(),
            ));
        }

        let ids: Vec<String> = usable.iter().map(|(id, _)| (*id).clone()).collect();
        let means = DVector::from_iterator(
            usable.len(),
            usable
                .iter()
                .map(|(_, r)| r.iter().sum::<f64>() / r.len() as f64),
        );

        let common_len = usable.iter().map(|(_, r)| r.len()).min().unwrap_or(0);
        if common_len < 2 {
            return Err(AllocationError::InsufficientData(format!(
                "covariance needs at least 2 common observations, have {}",
                common_len
            )));
        }

        let aligned_returns = DMatrix::from_fn(common_len, usable.len(), |row, col| {
            let series = usable[col].1;
            series[series.len() - common_len + row]
        });
        let covariance = sample_covariance(&aligned_returns);

        if means.iter().any(|v| !v.is_finite()) || covariance.iter().any(|v| !v.is_finite()) {
            return Err(AllocationError::Calculation(
                "non-finite mean or covariance estimate".to_string(),
            ));
        }

        Ok(Self {
            ids,
            means,
            covariance,
            aligned_returns,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Daily portfolio returns over the aligned slice for weights `w`.
    pub fn portfolio_returns(&self, weights: &DVector<f64>) -> Vec<f64> {
        (&self.aligned_returns * weights).iter().copied().collect()
    }

    pub fn portfolio_mean(&self, weights: &DVector<f64>) -> f64 {
        self.means.dot(weights)
    }

    pub fn portfolio_std(&self, weights: &DVector<f64>) -> f64 {
        let variance = (&self.covariance * weights).dot(weights);
        if variance > 0.0 {
            variance.sqrt()
        } else {
            0.0
        }
    }
}

/// Sample covariance (n - 1 denominator) of the columns of `returns`.
pub fn sample_covariance(returns: &DMatrix<f64>) -> DMatrix<f64> {
    let (rows, cols) = returns.shape();
    if rows < 2 {
        return DMatrix::zeros(cols, cols);
    }
    let centered = center_columns(returns);
    (centered.transpose() * &centered) / (rows as f64 - 1.0)
}

/// Pearson correlation of the columns of `returns`. Columns with zero
/// variance correlate 0 with everything else and 1 with themselves.
pub fn correlation_matrix(returns: &DMatrix<f64>) -> DMatrix<f64> {
    let cov = sample_covariance(returns);
    let n = cov.nrows();
    DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            return 1.0;
        }
        let denom = (cov[(i, i)] * cov[(j, j)]).sqrt();
        if denom > 1e-15 && denom.is_finite() {
            (cov[(i, j)] / denom).clamp(-1.0, 1.0)
        } else {
            0.0
        }
    })
}

fn center_columns(returns: &DMatrix<f64>) -> DMatrix<f64> {
    let mut centered = returns.clone();
    let rows = returns.nrows() as f64;
    for mut column in centered.column_iter_mut() {
        let mean = column.iter().sum::<f64>() / rows;
        column.iter_mut().for_each(|v| *v -= mean);
    }
    centered
}
