//! # Execution Engine
//!
//! Turns price snapshots into signals, sizes and gates them under per-account
//! risk limits, submits bracketed orders, manages scaled exits, and retunes
//! per-instrument parameters from recent outcomes.
//!
//! ## Modules
//! - `indicators`: EMA, Wilder volatility, bands, confirmations, spike flag.
//! - `strategy`: the `Strategy` trait and the volatility-band breakout.
//! - `sizing`: risk-based position sizing with reward and profit guards.
//! - `risk_guard`: per-account `RiskState` and the ordered policy gate.
//! - `lifecycle`: entry submission, bracket repair, scaled exits, trade tracking.
//! - `cap_enforcer`: trims pending entries back under the concurrent cap.
//! - `news`: halt/throttle windows from the news collaborator.
//! - `tuner`: shared parameter store and the adaptive tuner.
//! - `router`: per-account signal executors with fallback.
//! - `engine`: the per-account pipeline and the task that drives it.
//! - `io`: operator command intake.
//! - `models`: configuration, adaptive parameters, exit journal.

pub mod cap_enforcer;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod io;
pub mod lifecycle;
pub mod models;
pub mod news;
pub mod risk_guard;
pub mod router;
pub mod sizing;
pub mod strategy;
pub mod tuner;

pub use engine::{AccountPipeline, CycleReport, ExecutionOutcome, SharedServices};
pub use error::{EngineError, Result};
pub use router::{AccountRouter, RouteError, SignalExecutor};
