//! Signal generation.
//!
//! A `Strategy` looks at one instrument's `MarketView` and proposes zero or
//! more signals; `select_signal` reduces them to the single signal allowed
//! per instrument per cycle.

pub mod breakout;
pub mod session;

pub use breakout::BreakoutStrategy;
pub use session::SessionWindow;

use crate::indicators::IndicatorSet;
use crate::models::AdaptiveParameters;
use chrono::{DateTime, Utc};
use log::info;
use trading::{InstrumentConfig, PriceSnapshot, Signal};

/// Everything a strategy may look at for one instrument in one cycle.
#[derive(Debug, Clone, Copy)]
pub struct MarketView<'a> {
    pub instrument: &'a InstrumentConfig,
    pub snapshot: &'a PriceSnapshot,
    pub indicators: &'a IndicatorSet,
    pub params: &'a AdaptiveParameters,
    /// Mid observed on the previous cycle, if any.
    pub previous_mid: Option<f64>,
    pub now: DateTime<Utc>,
}

pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&mut self, view: &MarketView<'_>) -> Vec<Signal>;
}

/// Keeps the valid signal with the highest confidence for `instrument`.
///
/// Signals with a non-positive stop distance never get past this point.
pub fn select_signal(instrument: &str, candidates: Vec<Signal>) -> Option<Signal> {
    candidates
        .into_iter()
        .filter(|s| s.instrument() == instrument)
        .filter(|s| {
            let valid = s.is_valid();
            if !valid {
                info!(
                    "Discarding invalid {} signal on {} from {} (stop distance {:.6})",
                    s.side(),
                    s.instrument(),
                    s.strategy(),
                    s.stop_distance()
                );
            }
            valid
        })
        .max_by(|a, b| a.confidence().total_cmp(&b.confidence()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use trading::Side;

    #[test]
    fn test_select_keeps_highest_confidence() {
        let low = Signal::new("EUR_USD", Side::Buy, 1.1, 1.09, 1.12, 0.4, "a");
        let high = Signal::new("EUR_USD", Side::Sell, 1.1, 1.11, 1.08, 0.9, "b");
        let chosen = select_signal("EUR_USD", vec![low, high.clone()]).unwrap();
        assert_eq!(chosen, high);
    }

    #[test]
    fn test_select_drops_invalid_and_foreign() {
        let zero_stop = Signal::new("EUR_USD", Side::Buy, 1.1, 1.1, 1.12, 1.0, "a");
        let wrong_side = Signal::new("EUR_USD", Side::Buy, 1.1, 1.2, 1.12, 1.0, "a");
        let foreign = Signal::new("GBP_USD", Side::Buy, 1.3, 1.29, 1.31, 1.0, "a");
        assert!(select_signal("EUR_USD", vec![zero_stop, wrong_side, foreign]).is_none());
    }
}
