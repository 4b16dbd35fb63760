use super::{Policy, RiskContext, RiskDecision};
use trading::Signal;

/// Blocks entries while trading is disabled, while a news halt or throttle
/// window is active, or while the instrument itself is halted.
pub struct HaltWindowPolicy;

impl Policy for HaltWindowPolicy {
    fn name(&self) -> &str {
        "HaltWindow"
    }

    fn check(&self, signal: &Signal, ctx: &RiskContext) -> RiskDecision {
        if !ctx.state.trading_enabled() {
            return RiskDecision::Rejected("trading disabled by operator".to_string());
        }
        if ctx.state.in_halt_window(ctx.now) {
            return RiskDecision::Rejected(format!(
                "halt until {:?}, throttle until {:?}",
                ctx.state.halt_until(),
                ctx.state.throttle_until()
            ));
        }
        if ctx.state.instrument_halted(signal.instrument(), ctx.now) {
            return RiskDecision::Rejected(format!("{} halted", signal.instrument()));
        }
        RiskDecision::Approved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLimits;
    use crate::risk_guard::test_support::*;
    use crate::risk_guard::{Exposure, RiskGuard, RiskState};
    use chrono::Duration;

    fn guard() -> RiskGuard {
        let mut guard = RiskGuard::new();
        guard.add_policy(Box::new(HaltWindowPolicy));
        guard
    }

    fn decide(state: &RiskState) -> RiskDecision {
        check_with(
            &guard(),
            &buy("EUR_USD", 1.1),
            state,
            &RiskLimits::default(),
            &Exposure::default(),
        )
    }

    #[test]
    fn test_news_halt_and_throttle() {
        let mut state = RiskState::new(0.01, now());
        assert_eq!(decide(&state), RiskDecision::Approved);

        state.extend_halt(now() + Duration::minutes(10));
        assert!(matches!(decide(&state), RiskDecision::Rejected(_)));

        let mut state = RiskState::new(0.01, now());
        state.set_throttle(now() + Duration::minutes(10));
        assert!(matches!(decide(&state), RiskDecision::Rejected(_)));

        let mut state = RiskState::new(0.01, now());
        state.set_throttle(now() - Duration::minutes(1));
        assert_eq!(decide(&state), RiskDecision::Approved);
    }

    #[test]
    fn test_instrument_halt_is_scoped() {
        let mut state = RiskState::new(0.01, now());
        state.halt_instrument("GBP_USD", now() + Duration::minutes(5), now());
        assert_eq!(decide(&state), RiskDecision::Approved);
        state.halt_instrument("EUR_USD", now() + Duration::minutes(5), now());
        assert!(matches!(decide(&state), RiskDecision::Rejected(_)));
    }
}
