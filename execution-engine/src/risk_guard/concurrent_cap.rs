use super::{Policy, RiskContext, RiskDecision};
use trading::Signal;

/// Open trades plus pending entries must stay below the account cap.
pub struct ConcurrentCapPolicy;

impl Policy for ConcurrentCapPolicy {
    fn name(&self) -> &str {
        "ConcurrentCap"
    }

    fn check(&self, _signal: &Signal, ctx: &RiskContext) -> RiskDecision {
        let live = ctx.exposure.live_count();
        if live >= ctx.limits.concurrent_cap {
            return RiskDecision::Rejected(format!(
                "{} live, cap {}",
                live, ctx.limits.concurrent_cap
            ));
        }
        RiskDecision::Approved
    }
}
