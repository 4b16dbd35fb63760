//! Market data models.
//!
//! `PriceSnapshot` is the per-cycle quote for one instrument; `Candle` is a
//! completed bar from the broker's history endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current quote for an instrument. Produced each cycle and discarded after use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub instrument: String,
    pub bid: f64,
    pub ask: f64,
    /// Whether the broker currently accepts orders on the instrument.
    pub tradeable: bool,
    pub timestamp: DateTime<Utc>,
}

impl PriceSnapshot {
    pub fn new(
        instrument: impl Into<String>,
        bid: f64,
        ask: f64,
        tradeable: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            bid,
            ask,
            tradeable,
            timestamp,
        }
    }

    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }

    /// Age of the quote relative to `now`, in whole seconds. Never negative.
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_seconds().max(0)
    }

    /// A quote is well-formed when both sides are finite, positive and not crossed.
    pub fn is_well_formed(&self) -> bool {
        self.bid.is_finite() && self.ask.is_finite() && self.bid > 0.0 && self.ask >= self.bid
    }
}

/// A completed bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(time: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
        }
    }

    /// Flat bar at a single price, handy for synthetic series.
    pub fn flat(time: DateTime<Utc>, price: f64) -> Self {
        Self::new(time, price, price, price, price)
    }
}
