use crate::state::PortfolioState;

/// Drawdown protection: a once-per-window proportional scale and a per-day
/// hard stop, both keyed on drawdown from the run-wide peak.
#[derive(Debug, Clone, Copy)]
pub struct DrawdownGuard {
    enabled: bool,
    threshold: f64,
}

impl DrawdownGuard {
    pub fn new(enabled: bool, threshold: f64) -> Self {
        Self { enabled, threshold }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn breached(&self, state: &PortfolioState) -> Option<f64> {
        if !self.enabled || self.threshold <= 0.0 {
            return None;
        }
        let dd = state.drawdown();
        (dd > self.threshold).then_some(dd)
    }

    /// `max(0, 1 - excess / threshold)` once drawdown exceeds the threshold.
    pub fn window_scale(&self, state: &PortfolioState) -> f64 {
        match self.breached(state) {
            Some(dd) => (1.0 - (dd - self.threshold) / self.threshold).max(0.0),
            None => 1.0,
        }
    }

    /// True when the day must be flat.
    pub fn halts_day(&self, state: &PortfolioState) -> bool {
        self.breached(state).is_some()
    }

    /// Leverage multiplier for one day: 0 under a hard stop, else 1.
    pub fn daily_multiplier(&self, state: &PortfolioState) -> f64 {
        if self.halts_day(state) {
            0.0
        } else {
            1.0
        }
    }
}
