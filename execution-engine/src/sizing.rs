//! Position sizing.
//!
//! `units = floor(equity × risk_fraction / stop_distance)`, scaled up by the
//! account multiplier (only if above 1.0), clipped to the instrument maximum,
//! halved while the instrument is spiking, then checked against the
//! reward-to-risk and minimum-profit guards.

use crate::models::SizingConfig;
use std::fmt;
use trading::{InstrumentClass, InstrumentConfig, Signal};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SkipReason {
    InvalidStop,
    /// Risk budget buys less than one unit.
    NoUnits,
    RewardBelowMinimum { expected_r: f64 },
    ProfitBelowMinimum { profit: f64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InvalidStop => write!(f, "non-positive stop distance"),
            SkipReason::NoUnits => write!(f, "risk budget below one unit"),
            SkipReason::RewardBelowMinimum { expected_r } => {
                write!(f, "expected reward {:.2}R below minimum", expected_r)
            }
            SkipReason::ProfitBelowMinimum { profit } => {
                write!(f, "profit at target {:.2} below minimum", profit)
            }
        }
    }
}

/// Outcome of sizing one signal. Skipping is not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeDecision {
    Units(u64),
    Skip(SkipReason),
}

impl SizeDecision {
    pub fn units(&self) -> u64 {
        match self {
            SizeDecision::Units(u) => *u,
            SizeDecision::Skip(_) => 0,
        }
    }
}

/// Account-level inputs to sizing.
#[derive(Debug, Clone, Copy)]
pub struct RiskBudget {
    pub equity: f64,
    pub risk_fraction: f64,
    pub size_multiplier: f64,
}

#[derive(Debug, Clone)]
pub struct PositionSizer {
    cfg: SizingConfig,
}

impl PositionSizer {
    pub fn new(cfg: SizingConfig) -> Self {
        Self { cfg }
    }

    pub fn size(
        &self,
        signal: &Signal,
        instrument: &InstrumentConfig,
        budget: RiskBudget,
        spiking: bool,
    ) -> SizeDecision {
        let stop_distance = signal.stop_distance();
        if !signal.is_valid() || stop_distance <= 0.0 {
            return SizeDecision::Skip(SkipReason::InvalidStop);
        }

        let risk_amount = (budget.equity * budget.risk_fraction).max(0.0);
        let mut units = (risk_amount / stop_distance).floor();

        if budget.size_multiplier > 1.0 {
            units = (units * budget.size_multiplier).floor();
        }
        units = units.min(instrument.max_order_size as f64);
        if spiking {
            units = (units * self.cfg.spike_reduction).floor();
        }

        if !units.is_finite() || units < 1.0 {
            return SizeDecision::Skip(SkipReason::NoUnits);
        }
        let units = units as u64;

        let target_distance = signal.target_distance();
        if target_distance < self.cfg.min_expected_r * stop_distance {
            return SizeDecision::Skip(SkipReason::RewardBelowMinimum {
                expected_r: target_distance / stop_distance,
            });
        }

        let profit =
            profit_in_account_currency(instrument.class, units, target_distance, signal.entry());
        if profit < self.cfg.min_profit {
            return SizeDecision::Skip(SkipReason::ProfitBelowMinimum { profit });
        }

        SizeDecision::Units(units)
    }
}

/// Estimated profit of `units` moving `distance` in the account currency.
///
/// Yen-quoted pairs are converted with the entry price as the rate.
pub fn profit_in_account_currency(
    class: InstrumentClass,
    units: u64,
    distance: f64,
    entry: f64,
) -> f64 {
    let quote = units as f64 * distance;
    match class {
        InstrumentClass::JpyFx if entry > 0.0 => quote / entry,
        _ => quote,
    }
}
