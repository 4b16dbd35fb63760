//! In-memory broker.
//!
//! Market orders fill at the ask (buy) or bid (sell); limit orders rest as
//! pending entries until the quote crosses them. Brackets ride on the trade
//! and trigger on quote updates. Closed P&L is realised into the balance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use trading::{
    Broker, BrokerError, Candle, Fill, OpenPosition, OpenTrade, OrderRequest, OrderType,
    PendingOrder, PendingOrderKind, PriceSnapshot, Side, SubmitOutcome,
};

const MAX_CANDLES: usize = 1_000;

#[derive(Debug, Clone)]
struct RestingEntry {
    order: PendingOrder,
    side: Side,
    stop_loss: f64,
    take_profit: f64,
}

#[derive(Debug, Default)]
struct PaperState {
    balance: f64,
    next_id: u64,
    quotes: HashMap<String, PriceSnapshot>,
    candles: HashMap<String, Vec<Candle>>,
    trades: BTreeMap<String, OpenTrade>,
    resting: Vec<RestingEntry>,
    drop_brackets: bool,
    failure: Option<BrokerError>,
    submitted: usize,
    cancelled: Vec<String>,
}

impl PaperState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}{}", prefix, self.next_id)
    }

    fn check_available(&self) -> Result<(), BrokerError> {
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn quote(&self, instrument: &str) -> Result<&PriceSnapshot, BrokerError> {
        self.quotes
            .get(instrument)
            .ok_or_else(|| BrokerError::NotFound(format!("no quote for {}", instrument)))
    }

    fn open_trade(
        &mut self,
        instrument: &str,
        side: Side,
        units: u64,
        price: f64,
        brackets: (f64, f64),
        at: DateTime<Utc>,
    ) -> String {
        let id = self.next_id("T");
        let (stop_loss, take_profit) = if self.drop_brackets {
            (None, None)
        } else {
            (Some(brackets.0), Some(brackets.1))
        };
        self.trades.insert(
            id.clone(),
            OpenTrade {
                id: id.clone(),
                instrument: instrument.to_string(),
                side,
                units,
                price,
                stop_loss,
                take_profit,
                unrealized_pl: 0.0,
                opened_at: at,
            },
        );
        id
    }

    /// Closes up to `units` of a trade at the current quote and realises P&L.
    fn close(&mut self, trade_id: &str, units: Option<u64>) -> Result<u64, BrokerError> {
        let trade = self
            .trades
            .get(trade_id)
            .cloned()
            .ok_or_else(|| BrokerError::NotFound(format!("trade {}", trade_id)))?;
        let quote = self.quote(&trade.instrument)?.clone();
        let exit = exit_price(trade.side, &quote);
        let closed = units.unwrap_or(trade.units).min(trade.units);

        self.balance += (exit - trade.price) * trade.side.direction() * closed as f64;
        if closed == trade.units {
            self.trades.remove(trade_id);
        } else if let Some(t) = self.trades.get_mut(trade_id) {
            t.units -= closed;
        }
        Ok(closed)
    }

    /// Re-marks trades on `instrument`, fills crossed limit entries and
    /// triggers brackets.
    fn on_quote(&mut self, quote: &PriceSnapshot) {
        let symbol = quote.instrument.clone();

        let (crossed, resting): (Vec<_>, Vec<_>) = self.resting.drain(..).partition(|r| {
            r.order.instrument == symbol
                && match r.side {
                    Side::Buy => quote.ask <= r.order.price,
                    Side::Sell => quote.bid >= r.order.price,
                }
        });
        self.resting = resting;
        for entry in crossed {
            let id = self.open_trade(
                &symbol,
                entry.side,
                entry.order.units,
                entry.order.price,
                (entry.stop_loss, entry.take_profit),
                quote.timestamp,
            );
            debug!("Paper limit {} filled as {}", entry.order.id, id);
        }

        let mut triggered = Vec::new();
        for trade in self.trades.values_mut().filter(|t| t.instrument == symbol) {
            let exit = exit_price(trade.side, quote);
            let dir = trade.side.direction();
            trade.unrealized_pl = (exit - trade.price) * dir * trade.units as f64;
            let stop_hit = trade.stop_loss.is_some_and(|s| (exit - s) * dir <= 0.0);
            let target_hit = trade.take_profit.is_some_and(|t| (exit - t) * dir >= 0.0);
            if stop_hit || target_hit {
                triggered.push(trade.id.clone());
            }
        }
        for id in triggered {
            if let Ok(units) = self.close(&id, None) {
                info!("Paper bracket closed {} ({} units)", id, units);
            }
        }
    }
}

fn entry_price(side: Side, quote: &PriceSnapshot) -> f64 {
    match side {
        Side::Buy => quote.ask,
        Side::Sell => quote.bid,
    }
}

fn exit_price(side: Side, quote: &PriceSnapshot) -> f64 {
    entry_price(side.opposite(), quote)
}

/// Paper trading account. Every method is safe to call concurrently.
#[derive(Debug)]
pub struct PaperBroker {
    state: Mutex<PaperState>,
}

impl PaperBroker {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            state: Mutex::new(PaperState {
                balance: initial_balance,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PaperState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publishes a quote and runs fills/brackets against it.
    pub fn set_quote(&self, quote: PriceSnapshot) {
        let mut state = self.lock();
        state.quotes.insert(quote.instrument.clone(), quote.clone());
        state.on_quote(&quote);
    }

    pub fn set_candles(&self, instrument: &str, candles: Vec<Candle>) {
        self.lock().candles.insert(instrument.to_string(), candles);
    }

    pub fn push_candle(&self, instrument: &str, candle: Candle) {
        let mut state = self.lock();
        let series = state.candles.entry(instrument.to_string()).or_default();
        series.push(candle);
        if series.len() > MAX_CANDLES {
            let excess = series.len() - MAX_CANDLES;
            series.drain(..excess);
        }
    }

    /// While set, fills arrive without their stop-loss/take-profit legs.
    pub fn set_drop_brackets(&self, drop: bool) {
        self.lock().drop_brackets = drop;
    }

    /// Makes every call fail with `failure` until cleared with `None`.
    pub fn set_failure(&self, failure: Option<BrokerError>) {
        self.lock().failure = failure;
    }

    /// Places a trade directly, bypassing order submission.
    pub fn insert_trade(&self, trade: OpenTrade) {
        self.lock().trades.insert(trade.id.clone(), trade);
    }

    /// Rests a limit entry directly. Returns its order id.
    pub fn insert_pending_entry(
        &self,
        instrument: &str,
        side: Side,
        units: u64,
        price: f64,
        created_at: DateTime<Utc>,
    ) -> String {
        let mut state = self.lock();
        let id = state.next_id("O");
        state.resting.push(RestingEntry {
            order: PendingOrder {
                id: id.clone(),
                instrument: instrument.to_string(),
                kind: PendingOrderKind::Entry,
                units,
                price,
                trade_id: None,
                created_at,
            },
            side,
            stop_loss: price * (1.0 - 0.002 * side.direction()),
            take_profit: price * (1.0 + 0.003 * side.direction()),
        });
        id
    }

    pub fn trade(&self, id: &str) -> Option<OpenTrade> {
        self.lock().trades.get(id).cloned()
    }

    pub fn balance(&self) -> f64 {
        self.lock().balance
    }

    pub fn submitted_orders(&self) -> usize {
        self.lock().submitted
    }

    pub fn cancelled_orders(&self) -> Vec<String> {
        self.lock().cancelled.clone()
    }
}

#[async_trait]
impl Broker for PaperBroker {
    async fn account_equity(&self) -> Result<f64, BrokerError> {
        let state = self.lock();
        state.check_available()?;
        let open: f64 = state.trades.values().map(|t| t.unrealized_pl).sum();
        Ok(state.balance + open)
    }

    async fn price_snapshot(&self, instrument: &str) -> Result<PriceSnapshot, BrokerError> {
        let state = self.lock();
        state.check_available()?;
        state.quote(instrument).cloned()
    }

    async fn recent_candles(
        &self,
        instrument: &str,
        count: usize,
    ) -> Result<Vec<Candle>, BrokerError> {
        let state = self.lock();
        state.check_available()?;
        let series = state
            .candles
            .get(instrument)
            .ok_or_else(|| BrokerError::NotFound(format!("no candles for {}", instrument)))?;
        let start = series.len().saturating_sub(count);
        Ok(series[start..].to_vec())
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<SubmitOutcome, BrokerError> {
        let mut state = self.lock();
        state.check_available()?;
        if order.units == 0 {
            return Err(BrokerError::Rejected("zero units".into()));
        }
        let quote = state.quote(&order.instrument)?.clone();
        if !quote.tradeable {
            return Err(BrokerError::Rejected(format!(
                "{} not tradeable",
                order.instrument
            )));
        }
        state.submitted += 1;
        let order_id = state.next_id("O");

        match order.order_type {
            OrderType::Market => {
                let price = entry_price(order.side, &quote);
                let trade_id = state.open_trade(
                    &order.instrument,
                    order.side,
                    order.units,
                    price,
                    (order.stop_loss, order.take_profit),
                    quote.timestamp,
                );
                Ok(SubmitOutcome::filled(
                    order_id,
                    Fill {
                        trade_id,
                        price,
                        units: order.units,
                    },
                ))
            }
            OrderType::Limit(price) => {
                state.resting.push(RestingEntry {
                    order: PendingOrder {
                        id: order_id.clone(),
                        instrument: order.instrument.clone(),
                        kind: PendingOrderKind::Entry,
                        units: order.units,
                        price,
                        trade_id: None,
                        created_at: quote.timestamp,
                    },
                    side: order.side,
                    stop_loss: order.stop_loss,
                    take_profit: order.take_profit,
                });
                Ok(SubmitOutcome::pending(order_id))
            }
        }
    }

    async fn open_positions(&self) -> Result<Vec<OpenPosition>, BrokerError> {
        let state = self.lock();
        state.check_available()?;
        let mut positions: BTreeMap<&str, OpenPosition> = BTreeMap::new();
        for t in state.trades.values() {
            let p = positions
                .entry(t.instrument.as_str())
                .or_insert_with(|| OpenPosition {
                    instrument: t.instrument.clone(),
                    long_units: 0,
                    short_units: 0,
                    unrealized_pl: 0.0,
                });
            match t.side {
                Side::Buy => p.long_units += t.units,
                Side::Sell => p.short_units += t.units,
            }
            p.unrealized_pl += t.unrealized_pl;
        }
        Ok(positions.into_values().collect())
    }

    async fn open_trades(&self) -> Result<Vec<OpenTrade>, BrokerError> {
        let state = self.lock();
        state.check_available()?;
        Ok(state.trades.values().cloned().collect())
    }

    async fn pending_orders(&self) -> Result<Vec<PendingOrder>, BrokerError> {
        let state = self.lock();
        state.check_available()?;
        let mut orders: Vec<PendingOrder> =
            state.resting.iter().map(|r| r.order.clone()).collect();
        for t in state.trades.values() {
            let legs = [
                (PendingOrderKind::StopLoss, t.stop_loss, "SL"),
                (PendingOrderKind::TakeProfit, t.take_profit, "TP"),
            ];
            for (kind, price, prefix) in legs {
                if let Some(price) = price {
                    orders.push(PendingOrder {
                        id: format!("{}-{}", prefix, t.id),
                        instrument: t.instrument.clone(),
                        kind,
                        units: t.units,
                        price,
                        trade_id: Some(t.id.clone()),
                        created_at: t.opened_at,
                    });
                }
            }
        }
        Ok(orders)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        let mut state = self.lock();
        state.check_available()?;
        let before = state.resting.len();
        state.resting.retain(|r| r.order.id != order_id);
        if state.resting.len() == before {
            return Err(BrokerError::NotFound(format!("order {}", order_id)));
        }
        state.cancelled.push(order_id.to_string());
        Ok(())
    }

    async fn close_trade(&self, trade_id: &str, units: Option<u64>) -> Result<u64, BrokerError> {
        let mut state = self.lock();
        state.check_available()?;
        state.close(trade_id, units)
    }

    async fn attach_brackets(
        &self,
        trade_id: &str,
        stop_loss: f64,
        take_profit: f64,
    ) -> Result<(), BrokerError> {
        let mut state = self.lock();
        state.check_available()?;
        let trade = state
            .trades
            .get_mut(trade_id)
            .ok_or_else(|| BrokerError::NotFound(format!("trade {}", trade_id)))?;
        trade.stop_loss = Some(stop_loss);
        trade.take_profit = Some(take_profit);
        Ok(())
    }
}
