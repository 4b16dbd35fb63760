use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1.0 for long exposure, -1.0 for short exposure.
    pub fn direction(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// A trade idea for one instrument.
///
/// Signals are created by a strategy, consumed once by sizing and the risk
/// gate, then discarded. They are never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    instrument: String,
    side: Side,
    entry: f64,
    stop: f64,
    target: f64,
    confidence: f64,
    strategy: String,
}

impl Signal {
    pub fn new(
        instrument: impl Into<String>,
        side: Side,
        entry: f64,
        stop: f64,
        target: f64,
        confidence: f64,
        strategy: impl Into<String>,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            side,
            entry,
            stop,
            target,
            confidence,
            strategy: strategy.into(),
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn entry(&self) -> f64 {
        self.entry
    }

    pub fn stop(&self) -> f64 {
        self.stop
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    pub fn stop_distance(&self) -> f64 {
        (self.entry - self.stop).abs()
    }

    pub fn target_distance(&self) -> f64 {
        (self.target - self.entry).abs()
    }

    /// A signal is actionable only with finite prices, a positive stop
    /// distance and the stop on the losing side of the entry.
    pub fn is_valid(&self) -> bool {
        let finite = self.entry.is_finite() && self.stop.is_finite() && self.target.is_finite();
        if !finite || self.entry <= 0.0 {
            return false;
        }
        let signed_stop = (self.entry - self.stop) * self.side.direction();
        signed_stop > 0.0
    }
}
