use super::exits::ExitFlags;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use trading::{OpenTrade, Side};

pub const ADOPTED_TAG: &str = "adopted";

/// A live trade as the engine tracks it, keyed by the broker trade id.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub id: String,
    pub instrument: String,
    pub side: Side,
    /// Units still open.
    pub units: u64,
    pub entry: f64,
    pub stop: Option<f64>,
    pub target: Option<f64>,
    /// Distance R is measured against. Fixed when tracking starts.
    pub risk_distance: Option<f64>,
    pub opened_at: DateTime<Utc>,
    pub strategy: String,
    pub flags: ExitFlags,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        instrument: impl Into<String>,
        side: Side,
        units: u64,
        entry: f64,
        stop: f64,
        target: f64,
        opened_at: DateTime<Utc>,
        strategy: impl Into<String>,
    ) -> Self {
        let risk = (entry - stop).abs();
        Self {
            id: id.into(),
            instrument: instrument.into(),
            side,
            units,
            entry,
            stop: Some(stop),
            target: Some(target),
            risk_distance: (risk > 0.0).then_some(risk),
            opened_at,
            strategy: strategy.into(),
            flags: ExitFlags::default(),
        }
    }

    /// Starts tracking a trade the engine did not open itself.
    pub fn adopt(open: &OpenTrade) -> Self {
        let risk_distance = open
            .stop_loss
            .map(|s| (open.price - s).abs())
            .filter(|d| *d > 0.0);
        Self {
            id: open.id.clone(),
            instrument: open.instrument.clone(),
            side: open.side,
            units: open.units,
            entry: open.price,
            stop: open.stop_loss,
            target: open.take_profit,
            risk_distance,
            opened_at: open.opened_at,
            strategy: ADOPTED_TAG.to_string(),
            flags: ExitFlags::default(),
        }
    }

    /// Unrealized R at `price`. `None` for trades without a risk distance,
    /// which are never managed for exits.
    pub fn r_multiple(&self, price: f64) -> Option<f64> {
        let risk = self.risk_distance?;
        Some((price - self.entry) * self.side.direction() / risk)
    }
}

/// Local view of live trades for one account.
#[derive(Debug, Default)]
pub struct TradeTracker {
    trades: BTreeMap<String, Trade>,
}

impl TradeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, trade: Trade) {
        self.trades.insert(trade.id.clone(), trade);
    }

    pub fn get(&self, id: &str) -> Option<&Trade> {
        self.trades.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Trade> {
        self.trades.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Trade> {
        self.trades.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.trades.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.trades.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trade> {
        self.trades.values()
    }

    /// Brings the tracker in line with the broker: adopts unknown live
    /// trades and drops tracked ones the broker no longer reports, whatever
    /// their exit flags. Returns `(adopted, pruned)` ids.
    pub fn reconcile(&mut self, live: &[OpenTrade]) -> (Vec<String>, Vec<String>) {
        let mut adopted = Vec::new();
        for open in live {
            match self.trades.get_mut(&open.id) {
                Some(trade) => {
                    trade.units = open.units;
                    if open.stop_loss.is_some() {
                        trade.stop = open.stop_loss;
                    }
                    if open.take_profit.is_some() {
                        trade.target = open.take_profit;
                    }
                }
                None => {
                    self.insert(Trade::adopt(open));
                    adopted.push(open.id.clone());
                }
            }
        }

        let pruned: Vec<String> = self
            .trades
            .keys()
            .filter(|id| !live.iter().any(|o| &o.id == *id))
            .cloned()
            .collect();
        for id in &pruned {
            self.trades.remove(id);
        }
        (adopted, pruned)
    }
}
