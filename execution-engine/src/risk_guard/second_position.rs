use super::{Policy, RiskContext, RiskDecision};
use trading::{OpenTrade, Signal};

/// A second entry on a held instrument needs at least one existing trade
/// there to be `second_position_min_r` in profit, measured against that
/// trade's own stop distance.
pub struct SecondPositionPolicy;

/// Unrealized R of `trade` at `price`. `None` without a usable stop.
pub fn unrealized_r(trade: &OpenTrade, price: f64) -> Option<f64> {
    let stop = trade.stop_loss?;
    let risk = (trade.price - stop).abs();
    if risk <= 0.0 || !risk.is_finite() {
        return None;
    }
    Some((price - trade.price) * trade.side.direction() / risk)
}

impl Policy for SecondPositionPolicy {
    fn name(&self) -> &str {
        "SecondPosition"
    }

    fn check(&self, signal: &Signal, ctx: &RiskContext) -> RiskDecision {
        let symbol = signal.instrument();
        if !ctx.exposure.holds(symbol) {
            return RiskDecision::Approved;
        }

        // The signal's entry is the current mid of the same instrument.
        let best = ctx
            .exposure
            .trades_on(symbol)
            .filter_map(|t| unrealized_r(t, signal.entry()))
            .fold(None, |acc: Option<f64>, r| Some(acc.map_or(r, |a| a.max(r))));

        let min_r = ctx.limits.second_position_min_r;
        match best {
            Some(r) if r >= min_r => RiskDecision::Approved,
            Some(r) => RiskDecision::Rejected(format!(
                "existing {} position at {:.2}R, needs {:.2}R",
                symbol, r, min_r
            )),
            None => RiskDecision::Rejected(format!(
                "existing {} position has no stop to measure R against",
                symbol
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLimits;
    use crate::risk_guard::test_support::*;
    use crate::risk_guard::{Exposure, RiskGuard, RiskState};
    use trading::Side;

    fn guard() -> RiskGuard {
        let mut guard = RiskGuard::new();
        guard.add_policy(Box::new(SecondPositionPolicy));
        guard
    }

    #[test]
    fn test_unrealized_r() {
        let long = trade("t1", "EUR_USD", Side::Buy, 1.1000, 1.0980);
        assert!((unrealized_r(&long, 1.1010).unwrap() - 0.5).abs() < 1e-9);
        let short = trade("t2", "EUR_USD", Side::Sell, 1.1000, 1.1020);
        assert!((unrealized_r(&short, 1.0960).unwrap() - 2.0).abs() < 1e-9);

        let mut naked = long.clone();
        naked.stop_loss = None;
        assert!(unrealized_r(&naked, 1.2).is_none());
    }

    #[test]
    fn test_second_position_threshold() {
        let state = RiskState::new(0.01, now());
        let limits = RiskLimits::default();
        let existing = trade("t1", "EUR_USD", Side::Buy, 1.1000, 1.0980);
        let exposure = Exposure::new(vec![existing], vec![]);

        // 0.3R
        let d = check_with(&guard(), &buy("EUR_USD", 1.1006), &state, &limits, &exposure);
        assert!(matches!(d, RiskDecision::Rejected(_)));

        // 0.6R
        let d = check_with(&guard(), &buy("EUR_USD", 1.1012), &state, &limits, &exposure);
        assert_eq!(d, RiskDecision::Approved);

        // Another instrument is unaffected.
        let d = check_with(&guard(), &buy("GBP_USD", 1.3), &state, &limits, &exposure);
        assert_eq!(d, RiskDecision::Approved);
    }

    #[test]
    fn test_any_qualifying_trade_is_enough() {
        let state = RiskState::new(0.01, now());
        let exposure = Exposure::new(
            vec![
                trade("t1", "EUR_USD", Side::Buy, 1.1010, 1.0990),
                trade("t2", "EUR_USD", Side::Buy, 1.0990, 1.0970),
            ],
            vec![],
        );
        // t1 at -0.05R, t2 at 0.95R
        let d = check_with(
            &guard(),
            &buy("EUR_USD", 1.1009),
            &state,
            &RiskLimits::default(),
            &exposure,
        );
        assert_eq!(d, RiskDecision::Approved);
    }
}
