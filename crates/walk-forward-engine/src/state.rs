use allocation_core::metrics::drawdown_from_peak;

/// Equity carried across windows. Each simulated day consumes the state and
/// returns the next one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortfolioState {
    pub current_equity: f64,
    pub global_peak_equity: f64,
}

impl PortfolioState {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            current_equity: initial_capital,
            global_peak_equity: initial_capital,
        }
    }

    /// Drawdown from the run-wide peak as a positive fraction.
    pub fn drawdown(&self) -> f64 {
        drawdown_from_peak(self.global_peak_equity, self.current_equity)
    }

    /// Compound one day's return. Non-finite returns contribute nothing and
    /// equity never goes below zero.
    #[must_use]
    pub fn apply_return(self, daily_return: f64) -> Self {
        let r = if daily_return.is_finite() { daily_return } else { 0.0 };
        let next = self.current_equity * (1.0 + r);
        let current_equity = if next.is_finite() { next.max(0.0) } else { self.current_equity };
        Self {
            current_equity,
            global_peak_equity: self.global_peak_equity.max(current_equity),
        }
    }
}
