//! Risk gate.
//!
//! Policies run in order and the first rejection wins. A rejection only
//! means "no trade this cycle" and is logged at info.

use chrono::{DateTime, Utc};
use log::info;
use std::collections::BTreeSet;
use trading::{AccountId, InstrumentConfig, OpenTrade, PendingOrder, Signal};

pub mod concurrent_cap;
pub mod daily_cap;
pub mod diversification;
pub mod halt_window;
pub mod second_position;
pub mod state;
pub mod symbol_cap;

pub use state::RiskState;

use crate::models::RiskLimits;

#[derive(Debug, PartialEq)]
pub enum RiskDecision {
    Approved,
    Rejected(String),
}

/// Live broker exposure for one account: open trades plus pending entry
/// orders (bracket dependents excluded).
#[derive(Debug, Clone, Default)]
pub struct Exposure {
    pub trades: Vec<OpenTrade>,
    pub pending_entries: Vec<PendingOrder>,
}

impl Exposure {
    pub fn new(trades: Vec<OpenTrade>, pending: Vec<PendingOrder>) -> Self {
        Self {
            trades,
            pending_entries: pending.into_iter().filter(|o| o.is_entry()).collect(),
        }
    }

    pub fn live_count(&self) -> usize {
        self.trades.len() + self.pending_entries.len()
    }

    pub fn live_on(&self, symbol: &str) -> usize {
        self.trades.iter().filter(|t| t.instrument == symbol).count()
            + self
                .pending_entries
                .iter()
                .filter(|o| o.instrument == symbol)
                .count()
    }

    pub fn trades_on<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a OpenTrade> + 'a {
        self.trades.iter().filter(move |t| t.instrument == symbol)
    }

    /// Instruments with an open trade or a resting entry.
    pub fn exposed_symbols(&self) -> BTreeSet<&str> {
        self.trades
            .iter()
            .map(|t| t.instrument.as_str())
            .chain(self.pending_entries.iter().map(|o| o.instrument.as_str()))
            .collect()
    }

    /// Whether an open trade exists on `symbol`. Resting entries do not count.
    pub fn holds(&self, symbol: &str) -> bool {
        self.trades.iter().any(|t| t.instrument == symbol)
    }
}

/// Context passed to policies to make decisions.
pub struct RiskContext<'a> {
    pub account: &'a AccountId,
    pub state: &'a RiskState,
    pub limits: &'a RiskLimits,
    pub instrument: &'a InstrumentConfig,
    pub exposure: &'a Exposure,
    pub now: DateTime<Utc>,
}

pub trait Policy: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self, signal: &Signal, ctx: &RiskContext) -> RiskDecision;
}

pub struct RiskGuard {
    policies: Vec<Box<dyn Policy>>,
}

impl Default for RiskGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskGuard {
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
        }
    }

    /// The gate in its canonical order: halt window, daily cap, concurrent
    /// cap, per-symbol cap, diversification reserve, second position.
    pub fn standard() -> Self {
        let mut guard = Self::new();
        guard.add_policy(Box::new(halt_window::HaltWindowPolicy));
        guard.add_policy(Box::new(daily_cap::DailyCapPolicy));
        guard.add_policy(Box::new(concurrent_cap::ConcurrentCapPolicy));
        guard.add_policy(Box::new(symbol_cap::SymbolCapPolicy));
        guard.add_policy(Box::new(diversification::DiversificationPolicy));
        guard.add_policy(Box::new(second_position::SecondPositionPolicy));
        guard
    }

    pub fn add_policy(&mut self, policy: Box<dyn Policy>) {
        self.policies.push(policy);
    }

    pub fn check_signal(&self, signal: &Signal, ctx: &RiskContext) -> RiskDecision {
        for policy in &self.policies {
            match policy.check(signal, ctx) {
                RiskDecision::Rejected(reason) => {
                    info!(
                        "[{}] {} {} rejected by policy {}: {}",
                        ctx.account,
                        signal.side(),
                        signal.instrument(),
                        policy.name(),
                        reason
                    );
                    return RiskDecision::Rejected(format!("{}: {}", policy.name(), reason));
                }
                RiskDecision::Approved => continue,
            }
        }
        RiskDecision::Approved
    }
}
