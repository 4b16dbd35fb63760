//! Order lifecycle: entry submission with attached brackets, bracket
//! verification and repair, and the scaled-exit state machine.

pub mod exits;
pub mod tracker;

pub use exits::{next_step, ExitFlags, ExitStep};
pub use tracker::{Trade, TradeTracker};

use crate::error::{bounded, Result};
use crate::models::{EntryOrder, ExitConfig, ExitEvent, ExitJournal};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use trading::{
    AccountId, Broker, InstrumentConfig, Notifier, OpenTrade, OrderRequest, OrderType, Signal,
};

/// Result of submitting an entry.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    /// Filled immediately; the trade is now tracked under `trade_id`.
    Filled { trade_id: String, units: u64, price: f64 },
    /// Resting at the broker as a pending entry order.
    Pending { order_id: String },
}

/// Exits executed during one monitoring pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitSummary {
    pub partial: usize,
    pub full: usize,
}

pub struct OrderManager {
    account: AccountId,
    broker: Arc<dyn Broker>,
    notifier: Arc<dyn Notifier>,
    journal: Arc<ExitJournal>,
    exits: ExitConfig,
    entry_order: EntryOrder,
    timeout: Duration,
    tracker: TradeTracker,
    bracket_alerts: HashSet<String>,
}

impl OrderManager {
    pub fn new(
        account: AccountId,
        broker: Arc<dyn Broker>,
        notifier: Arc<dyn Notifier>,
        journal: Arc<ExitJournal>,
        exits: ExitConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            account,
            broker,
            notifier,
            journal,
            exits,
            entry_order: EntryOrder::Market,
            timeout,
            tracker: TradeTracker::new(),
            bracket_alerts: HashSet::new(),
        }
    }

    pub fn with_entry_order(mut self, entry_order: EntryOrder) -> Self {
        self.entry_order = entry_order;
        self
    }

    pub fn tracker(&self) -> &TradeTracker {
        &self.tracker
    }

    /// Submits an entry with stop-loss and take-profit attached in the same
    /// call. Prices are rounded to the instrument's precision.
    pub async fn submit_entry(
        &mut self,
        signal: &Signal,
        units: u64,
        instrument: &InstrumentConfig,
        now: DateTime<Utc>,
    ) -> Result<EntryOutcome> {
        let entry = instrument.round_price(signal.entry());
        let stop = instrument.round_price(signal.stop());
        let target = instrument.round_price(signal.target());
        let order_type = match self.entry_order {
            EntryOrder::Market => OrderType::Market,
            EntryOrder::Limit => OrderType::Limit(entry),
        };
        let request = OrderRequest {
            instrument: instrument.symbol.clone(),
            side: signal.side(),
            units,
            order_type,
            stop_loss: stop,
            take_profit: target,
            tag: signal.strategy().to_string(),
        };

        info!(
            "[{}] Submitting {} {} {} @ {} SL {} TP {} ({})",
            self.account,
            request.side,
            units,
            request.instrument,
            instrument.format_price(entry),
            instrument.format_price(stop),
            instrument.format_price(target),
            request.tag
        );
        let submit = self.broker.submit_order(&request);
        let outcome = bounded("submit_order", self.timeout, submit).await?;

        match outcome.fill {
            Some(fill) => {
                // R is measured against the distance actually risked from the fill.
                let trade = Trade::new(
                    fill.trade_id.clone(),
                    instrument.symbol.clone(),
                    signal.side(),
                    fill.units,
                    fill.price,
                    stop,
                    target,
                    now,
                    signal.strategy(),
                );
                self.tracker.insert(trade);
                info!(
                    "[{}] Filled {} {} @ {} as trade {}",
                    self.account, fill.units, instrument.symbol, fill.price, fill.trade_id
                );
                Ok(EntryOutcome::Filled {
                    trade_id: fill.trade_id,
                    units: fill.units,
                    price: fill.price,
                })
            }
            None => {
                info!(
                    "[{}] Entry order {} resting for {}",
                    self.account, outcome.order_id, instrument.symbol
                );
                Ok(EntryOutcome::Pending {
                    order_id: outcome.order_id,
                })
            }
        }
    }

    /// Adopts broker trades the tracker does not know and prunes tracked
    /// trades the broker no longer reports.
    pub fn reconcile(&mut self, live: &[OpenTrade]) -> (usize, usize) {
        let (adopted, pruned) = self.tracker.reconcile(live);
        for id in &adopted {
            info!("[{}] Adopted broker trade {}", self.account, id);
        }
        for id in &pruned {
            info!("[{}] Trade {} no longer live, dropped", self.account, id);
            self.bracket_alerts.remove(id);
        }
        (adopted.len(), pruned.len())
    }

    /// Makes sure every live trade carries both dependent orders. Missing
    /// legs are attached at the fallback distances from the entry price.
    /// Returns the number of trades repaired.
    pub async fn verify_brackets(
        &mut self,
        live: &[OpenTrade],
        instruments: &HashMap<String, InstrumentConfig>,
    ) -> usize {
        let mut repaired = 0;
        for open in live.iter().filter(|t| !t.has_brackets()) {
            let dir = open.side.direction();
            let round = |p: f64| {
                instruments
                    .get(&open.instrument)
                    .map_or(p, |i| i.round_price(p))
            };
            let stop = open.stop_loss.unwrap_or_else(|| {
                round(open.price - dir * open.price * self.exits.fallback_stop_pct)
            });
            let target = open.take_profit.unwrap_or_else(|| {
                round(open.price + dir * open.price * self.exits.fallback_target_pct)
            });

            warn!(
                "[{}] Trade {} on {} missing brackets, attaching SL {} TP {}",
                self.account, open.id, open.instrument, stop, target
            );
            let result = bounded(
                "attach_brackets",
                self.timeout,
                self.broker.attach_brackets(&open.id, stop, target),
            )
            .await;

            let message = match &result {
                Ok(()) => {
                    repaired += 1;
                    if let Some(trade) = self.tracker.get_mut(&open.id) {
                        trade.stop = Some(stop);
                        trade.target = Some(target);
                    }
                    format!(
                        "[{}] Attached missing brackets to {} {} (SL {}, TP {})",
                        self.account, open.instrument, open.id, stop, target
                    )
                }
                Err(e) => {
                    error!(
                        "[{}] Failed to attach brackets to {}: {}",
                        self.account, open.id, e
                    );
                    format!(
                        "[{}] Trade {} on {} is unprotected: {}",
                        self.account, open.id, open.instrument, e
                    )
                }
            };

            if self.bracket_alerts.insert(open.id.clone()) {
                if let Err(e) = self.notifier.send(&message).await {
                    warn!("[{}] Notification failed: {}", self.account, e);
                }
            }
        }
        repaired
    }

    /// Runs one pass of the exit state machine over tracked trades using
    /// current mids. Every step whose threshold is met runs in ascending
    /// order against the units still open. Flags move only after the broker
    /// confirms the close; a failed close ends the pass for that trade.
    pub async fn manage_exits(
        &mut self,
        mids: &HashMap<String, f64>,
        now: DateTime<Utc>,
    ) -> ExitSummary {
        let mut summary = ExitSummary::default();

        for id in self.tracker.ids() {
            let Some(trade) = self.tracker.get(&id) else {
                continue;
            };
            let Some(mid) = mids.get(&trade.instrument) else {
                continue;
            };
            let Some(r) = trade.r_multiple(*mid) else {
                continue;
            };

            loop {
                let step = match self.tracker.get(&id) {
                    Some(trade) => next_step(&trade.flags, r, &self.exits),
                    None => None,
                };
                let Some(step) = step else {
                    break;
                };
                if !self.close_step(&id, step, r, now).await {
                    break;
                }
                match step {
                    ExitStep::FullExit => summary.full += 1,
                    _ => summary.partial += 1,
                }
            }
        }
        summary
    }

    /// Closes the units for one exit step. Returns whether the broker
    /// confirmed the close.
    async fn close_step(
        &mut self,
        id: &str,
        step: ExitStep,
        r: f64,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(trade) = self.tracker.get(id) else {
            return false;
        };
        let units = step.units_to_close(trade.units);
        if units == 0 {
            return false;
        }
        let request = match step {
            ExitStep::FullExit => None,
            _ => Some(units),
        };
        let instrument = trade.instrument.clone();

        let closed = match bounded(
            "close_trade",
            self.timeout,
            self.broker.close_trade(id, request),
        )
        .await
        {
            Ok(closed) => closed,
            Err(e) => {
                warn!("[{}] {:?} on {} failed: {}", self.account, step, id, e);
                return false;
            }
        };

        info!(
            "[{}] {:?} on {} {}: closed {} units at {:.2}R",
            self.account, step, instrument, id, closed, r
        );
        self.journal.record(ExitEvent::new(
            self.account.clone(),
            instrument,
            id.to_string(),
            step.kind(),
            closed,
            r,
            now,
        ));

        let fully_closed = match self.tracker.get_mut(id) {
            Some(trade) => {
                trade.flags.mark(step);
                trade.units = trade.units.saturating_sub(closed);
                step == ExitStep::FullExit || trade.units == 0
            }
            None => false,
        };
        if fully_closed {
            self.tracker.remove(id);
            self.bracket_alerts.remove(id);
        }
        true
    }
}
