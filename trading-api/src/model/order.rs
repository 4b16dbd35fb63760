use super::signal::Side;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit(f64),
}

/// An entry order with its protective bracket attached in the same call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub instrument: String,
    pub side: Side,
    pub units: u64,
    pub order_type: OrderType,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Free-form tag carried to the broker (strategy identifier).
    pub tag: String,
}

/// A fill that opened a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub trade_id: String,
    pub price: f64,
    pub units: u64,
}

/// Broker response to an order submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub order_id: String,
    /// Present when the order filled immediately. Limit orders usually rest.
    pub fill: Option<Fill>,
}

impl SubmitOutcome {
    pub fn pending(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            fill: None,
        }
    }

    pub fn filled(order_id: impl Into<String>, fill: Fill) -> Self {
        Self {
            order_id: order_id.into(),
            fill: Some(fill),
        }
    }
}
