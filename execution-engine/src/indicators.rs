//! Indicator engine.
//!
//! Everything here is recomputed from the rolling close window on every
//! cycle; nothing is persisted.
//!
//! - Average: EMA with `alpha = 2/(period+1)`, seeded with the simple mean
//!   of the first `period` closes.
//! - Volatility: mean absolute bar-to-bar change, Wilder smoothed
//!   (`v = (v*(n-1) + tr)/n`) after a simple-mean seed.
//! - Bands: `average ± k·volatility`.

use crate::models::{AdaptiveParameters, SignalConfig};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct IndicatorSet {
    pub average: f64,
    /// Zero means "no signal possible".
    pub volatility: f64,
    pub band_multiplier: f64,
    pub upper: f64,
    pub lower: f64,
    pub slope_up: bool,
    pub slope_down: bool,
    /// Of the last three closes, how many sit strictly above `upper`.
    pub confirm_above: usize,
    pub confirm_below: usize,
    pub volatility_spike: bool,
    pub htf_average: Option<f64>,
}

impl IndicatorSet {
    /// Builds a set with bands derived from `average ± k·volatility`.
    /// Slope, confirmation and spike fields start out false/zero.
    pub fn with_bands(average: f64, volatility: f64, band_multiplier: f64) -> Self {
        Self {
            average,
            volatility,
            band_multiplier,
            upper: average + band_multiplier * volatility,
            lower: average - band_multiplier * volatility,
            ..Default::default()
        }
    }

    pub fn is_ready(&self) -> bool {
        self.volatility > 0.0 && self.volatility.is_finite()
    }
}

/// Stateless indicator calculator configured with the spike and
/// higher-timeframe windows.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    spike_short: usize,
    spike_long: usize,
    spike_ratio: f64,
    htf_period: Option<usize>,
}

impl IndicatorEngine {
    pub fn new(spike_short: usize, spike_long: usize, spike_ratio: f64) -> Self {
        Self {
            spike_short,
            spike_long,
            spike_ratio,
            htf_period: None,
        }
    }

    pub fn from_config(cfg: &SignalConfig) -> Self {
        Self {
            spike_short: cfg.spike_short_bars,
            spike_long: cfg.spike_long_bars,
            spike_ratio: cfg.spike_ratio,
            htf_period: cfg.htf_period,
        }
    }

    pub fn with_htf_period(mut self, period: Option<usize>) -> Self {
        self.htf_period = period;
        self
    }

    /// Computes the indicator set for `closes` (oldest first).
    ///
    /// Returns a zeroed set when there is not enough history.
    pub fn compute(&self, closes: &[f64], params: &AdaptiveParameters) -> IndicatorSet {
        if closes.len() < params.warmup_bars() || closes.iter().any(|c| !c.is_finite()) {
            return IndicatorSet::default();
        }

        let (Some(average), Some(volatility)) = (
            ema(closes, params.avg_period),
            wilder_volatility(closes, params.vol_period),
        ) else {
            return IndicatorSet::default();
        };

        let mut set = IndicatorSet::with_bands(average, volatility, params.band_multiplier);

        let last3 = &closes[closes.len() - 3..];
        set.slope_up = last3.windows(2).all(|w| w[1] >= w[0]);
        set.slope_down = last3.windows(2).all(|w| w[1] <= w[0]);
        set.confirm_above = last3.iter().filter(|&&c| c > set.upper).count();
        set.confirm_below = last3.iter().filter(|&&c| c < set.lower).count();

        set.volatility_spike = self.spike(closes);
        set.htf_average = self.htf_period.and_then(|p| ema(closes, p));
        set
    }

    /// True when the mean absolute change of the last `spike_short` bars
    /// exceeds `spike_ratio` times that of the `spike_long` bars before them.
    pub fn spike(&self, closes: &[f64]) -> bool {
        let needed = self.spike_short + self.spike_long + 1;
        if self.spike_short == 0 || self.spike_long == 0 || closes.len() < needed {
            return false;
        }
        let changes: Vec<f64> = closes[closes.len() - needed..]
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .collect();
        let (long, short) = changes.split_at(self.spike_long);
        let long_mean = long.iter().sum::<f64>() / long.len() as f64;
        let short_mean = short.iter().sum::<f64>() / short.len() as f64;

        long_mean > 0.0 && short_mean > self.spike_ratio * long_mean
    }
}

/// Exponential moving average of the whole series, `None` if shorter than
/// `period`.
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    Some(
        values[period..]
            .iter()
            .fold(seed, |prev, v| alpha * v + (1.0 - alpha) * prev),
    )
}

/// Wilder-smoothed mean absolute close-to-close change.
pub fn wilder_volatility(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }
    let changes: Vec<f64> = closes.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    let n = period as f64;
    let seed = changes[..period].iter().sum::<f64>() / n;
    Some(
        changes[period..]
            .iter()
            .fold(seed, |atr, tr| (atr * (n - 1.0) + tr) / n),
    )
}
