use serde::{Deserialize, Serialize};

/// Per-instrument tunables consumed by the indicator engine and the signal
/// generator. Mutated only by the adaptive tuner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveParameters {
    /// EMA period of the moving average.
    pub avg_period: usize,
    /// Wilder smoothing period of the volatility estimate.
    pub vol_period: usize,
    /// Band multiplier `k`: bands sit at `average ± k·volatility`.
    pub band_multiplier: f64,
    /// Take-profit distance in units of volatility.
    pub tp_multiplier: f64,
    /// Stop-loss distance in units of volatility.
    pub sl_multiplier: f64,
}

impl Default for AdaptiveParameters {
    fn default() -> Self {
        Self {
            avg_period: 20,
            vol_period: 14,
            band_multiplier: 1.25,
            tp_multiplier: 1.5,
            sl_multiplier: 0.5,
        }
    }
}

impl AdaptiveParameters {
    /// Bars needed before the indicator engine produces anything.
    pub fn warmup_bars(&self) -> usize {
        self.avg_period.max(self.vol_period + 1).max(3)
    }
}
