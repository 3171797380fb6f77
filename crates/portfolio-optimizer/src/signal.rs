use allocation_core::{AllocationMap, SignalContext, SignalDecision, StrategySignal};

/// Approve or reject `signal` against an allocation map.
///
/// A strategy is approved iff it holds a positive weight. Capital and
/// quantity are scaled by that weight.
pub fn evaluate_against(
    allocations: Option<&AllocationMap>,
    signal: &StrategySignal,
    context: &SignalContext,
) -> SignalDecision {
    let Some(allocations) = allocations else {
        return rejected(signal, "no allocation has been computed yet");
    };

    let pct = allocations
        .get(&signal.strategy_id)
        .copied()
        .filter(|p| p.is_finite())
        .unwrap_or(0.0);

    if pct <= 0.0 {
        return rejected(signal, "strategy has no allocation");
    }

    let fraction = pct / 100.0;
    let equity = if context.account_equity.is_finite() {
        context.account_equity.max(0.0)
    } else {
        0.0
    };

    SignalDecision {
        approved: true,
        strategy_id: signal.strategy_id.clone(),
        direction: signal.direction,
        allocation_percent: pct,
        allocated_capital: equity * fraction,
        scaled_quantity: signal.quantity * fraction,
        reason: format!("allocated {:.2}% of equity", pct),
    }
}

fn rejected(signal: &StrategySignal, reason: &str) -> SignalDecision {
    SignalDecision {
        approved: false,
        strategy_id: signal.strategy_id.clone(),
        direction: signal.direction,
        allocation_percent: 0.0,
        allocated_capital: 0.0,
        scaled_quantity: 0.0,
        reason: reason.to_string(),
    }
}
