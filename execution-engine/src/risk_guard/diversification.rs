use super::{Policy, RiskContext, RiskDecision};
use trading::Signal;

/// Keeps the last few slots for other instruments.
///
/// Once free slots drop to `reserved_slots` and fewer than two distinct
/// instruments are held, another entry on an already-held instrument is
/// blocked. A resting entry holds its instrument as much as a trade does,
/// since it already takes a slot.
pub struct DiversificationPolicy;

impl Policy for DiversificationPolicy {
    fn name(&self) -> &str {
        "Diversification"
    }

    fn check(&self, signal: &Signal, ctx: &RiskContext) -> RiskDecision {
        let free = ctx
            .limits
            .concurrent_cap
            .saturating_sub(ctx.exposure.live_count());
        if free > ctx.limits.reserved_slots {
            return RiskDecision::Approved;
        }
        let exposed = ctx.exposure.exposed_symbols();
        let distinct = exposed.len();
        if distinct < 2 && exposed.contains(signal.instrument()) {
            return RiskDecision::Rejected(format!(
                "{} free slots reserved for other instruments ({} held)",
                free, distinct
            ));
        }
        RiskDecision::Approved
    }
}
