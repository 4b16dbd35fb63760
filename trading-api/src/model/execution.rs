//! The broker's view of live state: open trades, net positions, and orders
//! waiting to fill.

use super::signal::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single filled entry that is still open at the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenTrade {
    pub id: String,
    pub instrument: String,
    pub side: Side,
    /// Units still open.
    pub units: u64,
    /// Average fill price of the entry.
    pub price: f64,
    /// Price of the dependent stop-loss order, if one is attached.
    pub stop_loss: Option<f64>,
    /// Price of the dependent take-profit order, if one is attached.
    pub take_profit: Option<f64>,
    pub unrealized_pl: f64,
    pub opened_at: DateTime<Utc>,
}

impl OpenTrade {
    pub fn has_brackets(&self) -> bool {
        self.stop_loss.is_some() && self.take_profit.is_some()
    }
}

/// Net exposure on one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub instrument: String,
    pub long_units: u64,
    pub short_units: u64,
    pub unrealized_pl: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PendingOrderKind {
    /// Unfilled limit/stop order intended to open a position.
    Entry,
    StopLoss,
    TakeProfit,
    TrailingStop,
}

impl PendingOrderKind {
    /// Dependent orders protect an existing trade and must never be
    /// cancelled by capacity enforcement.
    pub fn is_dependent(&self) -> bool {
        !matches!(self, PendingOrderKind::Entry)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub id: String,
    pub instrument: String,
    pub kind: PendingOrderKind,
    pub units: u64,
    pub price: f64,
    /// Trade the order depends on (brackets only).
    pub trade_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PendingOrder {
    pub fn is_entry(&self) -> bool {
        self.kind == PendingOrderKind::Entry
    }
}
