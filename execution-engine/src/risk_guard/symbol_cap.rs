use super::{Policy, RiskContext, RiskDecision};
use trading::Signal;

/// Per-instrument cap taken from `InstrumentConfig::max_positions`.
pub struct SymbolCapPolicy;

impl Policy for SymbolCapPolicy {
    fn name(&self) -> &str {
        "SymbolCap"
    }

    fn check(&self, signal: &Signal, ctx: &RiskContext) -> RiskDecision {
        let live = ctx.exposure.live_on(signal.instrument());
        let cap = ctx.instrument.max_positions;
        if live >= cap {
            return RiskDecision::Rejected(format!(
                "{} live on {}, cap {}",
                live,
                signal.instrument(),
                cap
            ));
        }
        RiskDecision::Approved
    }
}
