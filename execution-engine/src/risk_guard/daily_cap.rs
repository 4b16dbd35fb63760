use super::{Policy, RiskContext, RiskDecision};
use trading::Signal;

pub struct DailyCapPolicy;

impl Policy for DailyCapPolicy {
    fn name(&self) -> &str {
        "DailyCap"
    }

    fn check(&self, _signal: &Signal, ctx: &RiskContext) -> RiskDecision {
        let cap = ctx.limits.daily_trade_cap;
        if ctx.state.daily_trades() >= cap {
            return RiskDecision::Rejected(format!(
                "{} trades today, cap {}",
                ctx.state.daily_trades(),
                cap
            ));
        }
        RiskDecision::Approved
    }
}
