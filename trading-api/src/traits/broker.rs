use crate::error::BrokerError;
use crate::model::{
    execution::{OpenPosition, OpenTrade, PendingOrder},
    market_data::{Candle, PriceSnapshot},
    order::{OrderRequest, SubmitOutcome},
};
use async_trait::async_trait;

/// Connection to one trading account at the broker.
///
/// Implementations own the transport (REST, paper, replay). Every call may
/// fail with a `BrokerError`; callers bound each call with their own timeout.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Net asset value of the account in account currency.
    async fn account_equity(&self) -> Result<f64, BrokerError>;

    /// Current quote and tradeable status for an instrument.
    async fn price_snapshot(&self, instrument: &str) -> Result<PriceSnapshot, BrokerError>;

    /// Most recent completed bars, oldest first.
    async fn recent_candles(&self, instrument: &str, count: usize)
    -> Result<Vec<Candle>, BrokerError>;

    /// Submits a market or limit entry with stop-loss/take-profit attached.
    async fn submit_order(&self, order: &OrderRequest) -> Result<SubmitOutcome, BrokerError>;

    async fn open_positions(&self) -> Result<Vec<OpenPosition>, BrokerError>;

    async fn open_trades(&self) -> Result<Vec<OpenTrade>, BrokerError>;

    /// All unfilled orders, entries and dependent brackets alike.
    async fn pending_orders(&self) -> Result<Vec<PendingOrder>, BrokerError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError>;

    /// Closes `units` of a trade, or all of it when `units` is `None`.
    /// Returns the number of units actually closed.
    async fn close_trade(&self, trade_id: &str, units: Option<u64>) -> Result<u64, BrokerError>;

    /// Attaches dependent stop-loss and take-profit orders to an open trade.
    async fn attach_brackets(
        &self,
        trade_id: &str,
        stop_loss: f64,
        take_profit: f64,
    ) -> Result<(), BrokerError>;
}
