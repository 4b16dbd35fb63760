//! Per-account trading pipeline.
//!
//! One `AccountPipeline` owns everything mutable about one account (risk
//! state, trade tracker, previous mids) and runs the full
//! snapshot → indicators → signal → size → gate → submit chain once per
//! cycle. The only state shared with other accounts is the parameter store
//! and the exit journal.

pub mod runtime;

#[cfg(test)]
mod tests;

pub use runtime::{run_account, spawn_account, AccountHandle, AccountMessage};

use crate::cap_enforcer::CapEnforcer;
use crate::error::{bounded, EngineError, Result};
use crate::indicators::IndicatorEngine;
use crate::lifecycle::{EntryOutcome, OrderManager};
use crate::models::{AccountConfig, EngineConfig, ExitJournal, RuntimeConfig};
use crate::news::NewsGate;
use crate::risk_guard::{Exposure, RiskContext, RiskDecision, RiskGuard, RiskState};
use crate::sizing::{PositionSizer, RiskBudget, SizeDecision, SkipReason};
use crate::strategy::{select_signal, BreakoutStrategy, MarketView, Strategy};
use crate::tuner::ParameterStore;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use trading::{
    AccountId, Broker, InstrumentConfig, NewsFeed, Notifier, PriceSnapshot, Side, Signal,
};
use trading_core::admin::{AdminCommand, AdminResponse, StatusReport};
use trading_core::clock::Clock;

pub const MANUAL_TAG: &str = "manual";

/// Upper bound accepted for a risk fraction, from config or operator.
pub const MAX_RISK_FRACTION: f64 = 0.05;

/// Collaborators shared by every account in the process.
#[derive(Clone)]
pub struct SharedServices {
    pub notifier: Arc<dyn Notifier>,
    pub journal: Arc<ExitJournal>,
    pub params: Arc<ParameterStore>,
    pub clock: Arc<dyn Clock>,
    pub news: Option<Arc<dyn NewsFeed>>,
}

/// What one cycle did. Logged at the end of every cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub signals: usize,
    pub orders_submitted: usize,
    pub fills: usize,
    pub partial_exits: usize,
    pub full_exits: usize,
    pub brackets_repaired: usize,
    pub cancelled: usize,
    pub skipped_instruments: Vec<String>,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "signals={} submitted={} fills={} partial_exits={} full_exits={} \
             repaired={} cancelled={} skipped={:?}",
            self.signals,
            self.orders_submitted,
            self.fills,
            self.partial_exits,
            self.full_exits,
            self.brackets_repaired,
            self.cancelled,
            self.skipped_instruments
        )
    }
}

/// How a signal left the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Submitted(EntryOutcome),
    Skipped(SkipReason),
    Rejected(String),
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionOutcome::Submitted(EntryOutcome::Filled {
                trade_id,
                units,
                price,
            }) => write!(f, "filled {} units at {} (trade {})", units, price, trade_id),
            ExecutionOutcome::Submitted(EntryOutcome::Pending { order_id }) => {
                write!(f, "entry order {} resting", order_id)
            }
            ExecutionOutcome::Skipped(reason) => write!(f, "skipped: {}", reason),
            ExecutionOutcome::Rejected(reason) => write!(f, "rejected: {}", reason),
        }
    }
}

pub struct AccountPipeline {
    account: AccountId,
    config: AccountConfig,
    runtime: RuntimeConfig,
    broker: Arc<dyn Broker>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    params: Arc<ParameterStore>,
    /// Configured order, used for iteration.
    symbols: Vec<String>,
    instruments: HashMap<String, InstrumentConfig>,
    state: RiskState,
    orders: OrderManager,
    guard: RiskGuard,
    sizer: PositionSizer,
    indicators: IndicatorEngine,
    strategy: Box<dyn Strategy>,
    news: NewsGate,
    cap: CapEnforcer,
    previous_mids: HashMap<String, f64>,
    /// Instruments flagged as volatility-spiking on their last evaluation.
    spiking: HashSet<String>,
    untradeable_since: HashMap<String, DateTime<Utc>>,
    /// Our resting entry orders, by order id, with their instrument.
    awaiting_fill: HashMap<String, String>,
}

impl AccountPipeline {
    pub fn new(
        cfg: &EngineConfig,
        account: &AccountConfig,
        broker: Arc<dyn Broker>,
        shared: &SharedServices,
    ) -> Self {
        let id = account.account_id();
        let timeout = std::time::Duration::from_secs(cfg.engine.call_timeout_secs);
        let orders = OrderManager::new(
            id.clone(),
            broker.clone(),
            shared.notifier.clone(),
            shared.journal.clone(),
            cfg.exits.clone(),
            timeout,
        )
        .with_entry_order(account.entry_order);
        let cap = CapEnforcer::new(
            id.clone(),
            broker.clone(),
            account.limits.concurrent_cap,
            timeout,
        );

        Self {
            state: RiskState::new(account.risk_fraction, shared.clock.now()),
            account: id,
            config: account.clone(),
            runtime: cfg.engine.clone(),
            broker,
            notifier: shared.notifier.clone(),
            clock: shared.clock.clone(),
            params: shared.params.clone(),
            symbols: cfg.instruments.iter().map(|i| i.symbol.clone()).collect(),
            instruments: cfg
                .instruments
                .iter()
                .map(|i| (i.symbol.clone(), i.clone()))
                .collect(),
            orders,
            guard: RiskGuard::standard(),
            sizer: PositionSizer::new(cfg.sizing.clone()),
            indicators: IndicatorEngine::from_config(&cfg.signal),
            strategy: Box::new(BreakoutStrategy::new(cfg.signal.clone())),
            news: NewsGate::new(shared.news.clone(), cfg.news.clone(), timeout),
            cap,
            previous_mids: HashMap::new(),
            spiking: HashSet::new(),
            untradeable_since: HashMap::new(),
            awaiting_fill: HashMap::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn Strategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_guard(mut self, guard: RiskGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    pub fn orders(&self) -> &OrderManager {
        &self.orders
    }

    fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.runtime.call_timeout_secs)
    }

    /// Runs one full pass for this account. Every failure is contained to
    /// the step that produced it.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let now = self.clock.now();
        let mut report = CycleReport::default();

        if self.state.roll_day(now) {
            info!(
                "[{}] New UTC day {}, daily counters reset",
                self.account,
                now.date_naive()
            );
        }
        self.news.refresh(&self.account, &mut self.state, now).await;

        let timeout = self.timeout();
        match bounded("open_trades", timeout, self.broker.open_trades()).await {
            Ok(live) => {
                self.orders.reconcile(&live);
                report.fills += self.confirm_resting_fills(&live).await;
                report.brackets_repaired =
                    self.orders.verify_brackets(&live, &self.instruments).await;
            }
            Err(e) => warn!("[{}] Skipping trade monitoring: {}", self.account, e),
        }

        let mut fresh: Vec<PriceSnapshot> = Vec::new();
        for symbol in self.symbols.clone() {
            match self.fresh_snapshot(&symbol, now).await {
                Some(snapshot) => fresh.push(snapshot),
                None => report.skipped_instruments.push(symbol),
            }
        }

        let mids: HashMap<String, f64> = fresh
            .iter()
            .map(|s| (s.instrument.clone(), s.mid()))
            .collect();
        let exits = self.orders.manage_exits(&mids, now).await;
        report.partial_exits = exits.partial;
        report.full_exits = exits.full;

        for snapshot in &fresh {
            let Some(signal) = self.evaluate(snapshot, now).await else {
                continue;
            };
            report.signals += 1;
            match self.execute_signal(&signal).await {
                Ok(ExecutionOutcome::Submitted(outcome)) => {
                    report.orders_submitted += 1;
                    if matches!(outcome, EntryOutcome::Filled { .. }) {
                        report.fills += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(
                    "[{}] Execution of {} signal failed: {}",
                    self.account,
                    signal.instrument(),
                    e
                ),
            }
        }

        match self.cap.enforce().await {
            Ok(cap) => {
                for id in &cap.cancelled {
                    self.awaiting_fill.remove(id);
                }
                report.cancelled = cap.cancelled.len();
            }
            Err(e) => warn!("[{}] Cap enforcement skipped: {}", self.account, e),
        }

        info!("[{}] Cycle complete: {}", self.account, report);
        report
    }

    /// Fetches a quote and decides whether it is usable this cycle. Stale or
    /// long-untradeable quotes halt the instrument briefly and alert once.
    async fn fresh_snapshot(
        &mut self,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Option<PriceSnapshot> {
        if self.state.instrument_halted(symbol, now) {
            debug!("[{}] {} halted, skipping", self.account, symbol);
            return None;
        }

        let timeout = self.timeout();
        let quote = bounded("price_snapshot", timeout, self.broker.price_snapshot(symbol)).await;
        let snapshot = match quote {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("[{}] No quote for {}: {}", self.account, symbol, e);
                return None;
            }
        };

        if !snapshot.is_well_formed() {
            info!(
                "[{}] Discarding malformed quote for {}: bid {} ask {}",
                self.account, symbol, snapshot.bid, snapshot.ask
            );
            return None;
        }

        let age = snapshot.age_secs(now);
        if age > self.runtime.stale_after_secs {
            self.halt_stale(symbol, format!("quote is {}s old", age), now)
                .await;
            return None;
        }

        if !snapshot.tradeable {
            let since = *self
                .untradeable_since
                .entry(symbol.to_string())
                .or_insert(now);
            let grace = Duration::seconds(self.runtime.untradeable_grace_secs);
            if now - since > grace {
                self.halt_stale(symbol, format!("not tradeable since {}", since), now)
                    .await;
            } else {
                debug!("[{}] {} not tradeable yet", self.account, symbol);
            }
            return None;
        }
        self.untradeable_since.remove(symbol);

        Some(snapshot)
    }

    async fn halt_stale(&mut self, symbol: &str, reason: String, now: DateTime<Utc>) {
        let until = now + Duration::minutes(self.runtime.stale_halt_minutes);
        let err = EngineError::StaleData {
            instrument: symbol.to_string(),
            reason,
        };
        warn!("[{}] {}", self.account, err);
        if self.state.halt_instrument(symbol, until, now) {
            let message = format!("[{}] {}, halted until {}", self.account, err, until);
            if let Err(e) = self.notifier.send(&message).await {
                warn!("[{}] Notification failed: {}", self.account, e);
            }
        }
    }

    /// Computes indicators, records the instrument's spike flag and asks the
    /// strategy for at most one signal.
    async fn evaluate(&mut self, snapshot: &PriceSnapshot, now: DateTime<Utc>) -> Option<Signal> {
        let symbol = snapshot.instrument.as_str();
        let instrument = self.instruments.get(symbol)?;
        let previous_mid = self.previous_mids.insert(symbol.to_string(), snapshot.mid());

        let timeout = self.timeout();
        let candles = match bounded(
            "recent_candles",
            timeout,
            self.broker.recent_candles(symbol, self.runtime.price_window),
        )
        .await
        {
            Ok(candles) => candles,
            Err(e) => {
                warn!("[{}] No history for {}: {}", self.account, symbol, e);
                return None;
            }
        };
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        let params = self.params.get(symbol);
        let indicators = self.indicators.compute(&closes, &params);
        if indicators.volatility_spike {
            self.spiking.insert(symbol.to_string());
        } else {
            self.spiking.remove(symbol);
        }
        let view = MarketView {
            instrument,
            snapshot,
            indicators: &indicators,
            params: &params,
            previous_mid,
            now,
        };
        let candidates = self.strategy.evaluate(&view);
        select_signal(symbol, candidates)
    }

    /// Sizes, gates and submits one signal. Size is halved while the
    /// instrument is spiking, whatever the signal's source.
    ///
    /// Skips and rejections are normal outcomes; only collaborator failures
    /// come back as errors.
    pub async fn execute_signal(&mut self, signal: &Signal) -> Result<ExecutionOutcome> {
        let now = self.clock.now();
        let instrument = self
            .instruments
            .get(signal.instrument())
            .cloned()
            .ok_or_else(|| EngineError::UnknownInstrument(signal.instrument().to_string()))?;

        let timeout = self.timeout();
        let equity = bounded("account_equity", timeout, self.broker.account_equity()).await?;
        let budget = RiskBudget {
            equity,
            risk_fraction: self.state.current_risk_fraction(),
            size_multiplier: self.config.size_multiplier,
        };
        let spiking = self.spiking.contains(signal.instrument());
        let units = match self.sizer.size(signal, &instrument, budget, spiking) {
            SizeDecision::Units(units) => units,
            SizeDecision::Skip(reason) => {
                info!(
                    "[{}] {} {} skipped: {}",
                    self.account,
                    signal.side(),
                    signal.instrument(),
                    reason
                );
                return Ok(ExecutionOutcome::Skipped(reason));
            }
        };

        let trades = bounded("open_trades", timeout, self.broker.open_trades()).await?;
        let pending = bounded("pending_orders", timeout, self.broker.pending_orders()).await?;
        let exposure = Exposure::new(trades, pending);
        let ctx = RiskContext {
            account: &self.account,
            state: &self.state,
            limits: &self.config.limits,
            instrument: &instrument,
            exposure: &exposure,
            now,
        };
        if let RiskDecision::Rejected(reason) = self.guard.check_signal(signal, &ctx) {
            return Ok(ExecutionOutcome::Rejected(reason));
        }

        let outcome = self
            .orders
            .submit_entry(signal, units, &instrument, now)
            .await?;
        match &outcome {
            EntryOutcome::Filled { .. } => {
                self.state.record_fill();
                match bounded("open_trades", timeout, self.broker.open_trades()).await {
                    Ok(live) => {
                        self.orders.verify_brackets(&live, &self.instruments).await;
                    }
                    Err(e) => warn!(
                        "[{}] Could not verify brackets after fill: {}",
                        self.account, e
                    ),
                }
            }
            EntryOutcome::Pending { order_id } => {
                self.awaiting_fill
                    .insert(order_id.clone(), instrument.symbol.clone());
            }
        }
        Ok(ExecutionOutcome::Submitted(outcome))
    }

    /// Counts resting entries that left the book as fills, provided the
    /// broker now reports a trade on their instrument.
    async fn confirm_resting_fills(&mut self, live: &[trading::OpenTrade]) -> usize {
        if self.awaiting_fill.is_empty() {
            return 0;
        }
        let timeout = self.timeout();
        let pending = bounded("pending_orders", timeout, self.broker.pending_orders()).await;
        let pending = match pending {
            Ok(pending) => pending,
            Err(e) => {
                warn!("[{}] Could not check resting entries: {}", self.account, e);
                return 0;
            }
        };

        let gone: Vec<(String, String)> = self
            .awaiting_fill
            .iter()
            .filter(|(id, _)| !pending.iter().any(|o| &o.id == *id))
            .map(|(id, symbol)| (id.clone(), symbol.clone()))
            .collect();

        let mut filled = 0;
        for (id, symbol) in gone {
            self.awaiting_fill.remove(&id);
            if live.iter().any(|t| t.instrument == symbol) {
                info!("[{}] Resting entry {} on {} filled", self.account, id, symbol);
                self.state.record_fill();
                filled += 1;
            } else {
                info!(
                    "[{}] Resting entry {} on {} left the book",
                    self.account, id, symbol
                );
            }
        }
        filled
    }

    /// Applies an operator command to this account.
    pub async fn apply_command(&mut self, command: AdminCommand) -> AdminResponse {
        match command {
            AdminCommand::EnableTrading => {
                self.state.set_trading_enabled(true);
                info!("[{}] Trading enabled by operator", self.account);
                AdminResponse::Ok
            }
            AdminCommand::DisableTrading => {
                self.state.set_trading_enabled(false);
                info!("[{}] Trading disabled by operator", self.account);
                AdminResponse::Ok
            }
            AdminCommand::SetRiskFraction { fraction } => {
                if !(fraction > 0.0 && fraction <= MAX_RISK_FRACTION) {
                    return AdminResponse::Error(format!(
                        "risk fraction must be in (0, {}]",
                        MAX_RISK_FRACTION
                    ));
                }
                self.state.set_risk_fraction(fraction);
                info!("[{}] Risk fraction set to {}", self.account, fraction);
                AdminResponse::Ok
            }
            AdminCommand::SetNewsHalt { minutes } => {
                if minutes <= 0 {
                    return AdminResponse::Error("halt minutes must be positive".to_string());
                }
                let until = self.clock.now() + Duration::minutes(minutes);
                self.state.extend_halt(until);
                info!("[{}] News halt until {}", self.account, until);
                AdminResponse::Ok
            }
            AdminCommand::ManualTrade {
                instrument,
                side,
                stop_distance,
                target_distance,
            } => {
                match self
                    .manual_trade(&instrument, side, stop_distance, target_distance)
                    .await
                {
                    Ok(outcome) => AdminResponse::Executed(outcome.to_string()),
                    Err(e) => AdminResponse::Error(e.to_string()),
                }
            }
            AdminCommand::ExecuteSignal { signal, .. } => {
                match self.execute_signal(&signal).await {
                    Ok(outcome) => AdminResponse::Executed(outcome.to_string()),
                    Err(e) => AdminResponse::Error(e.to_string()),
                }
            }
            AdminCommand::Status => AdminResponse::Status(self.status()),
        }
    }

    /// Builds a signal at the current mid and runs it through sizing and
    /// the gate like any strategy signal.
    async fn manual_trade(
        &mut self,
        symbol: &str,
        side: Side,
        stop_distance: f64,
        target_distance: f64,
    ) -> Result<ExecutionOutcome> {
        if !(stop_distance > 0.0 && stop_distance.is_finite()) {
            return Err(EngineError::Validation(format!(
                "stop distance {} must be positive",
                stop_distance
            )));
        }
        if !(target_distance > 0.0 && target_distance.is_finite()) {
            return Err(EngineError::Validation(format!(
                "target distance {} must be positive",
                target_distance
            )));
        }
        if !self.instruments.contains_key(symbol) {
            return Err(EngineError::UnknownInstrument(symbol.to_string()));
        }

        let timeout = self.timeout();
        let snapshot =
            bounded("price_snapshot", timeout, self.broker.price_snapshot(symbol)).await?;
        if !snapshot.is_well_formed() {
            return Err(EngineError::Validation(format!(
                "malformed quote for {}",
                symbol
            )));
        }
        let entry = snapshot.mid();
        let dir = side.direction();
        let signal = Signal::new(
            symbol,
            side,
            entry,
            entry - dir * stop_distance,
            entry + dir * target_distance,
            1.0,
            MANUAL_TAG,
        );
        info!(
            "[{}] Manual {} {} requested (SL {}, TP {})",
            self.account,
            side,
            symbol,
            signal.stop(),
            signal.target()
        );
        self.execute_signal(&signal).await
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            account: self.account.clone(),
            trading_enabled: self.state.trading_enabled(),
            daily_trades: self.state.daily_trades(),
            daily_cap: self.config.limits.daily_trade_cap,
            halt_until: self.state.halt_until(),
            throttle_until: self.state.throttle_until(),
            base_risk_fraction: self.state.base_risk_fraction(),
            current_risk_fraction: self.state.current_risk_fraction(),
            tracked_trades: self.orders.tracker().len(),
        }
    }
}
