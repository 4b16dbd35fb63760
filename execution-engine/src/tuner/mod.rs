//! Adaptive tuner.
//!
//! Scores each instrument from the trailing window of exit events
//! (partial25 = 0.25, partial50 = 0.50, full exit = 1.00) and nudges its
//! band and take-profit multipliers:
//!
//! - average above `high_threshold`: tighten the band, widen take-profit
//! - average below `low_threshold`: widen the band, tighten take-profit
//!
//! Results are always clamped to the configured bounds.

pub mod store;

pub use store::{ParameterChange, ParameterStore};

use crate::models::{AdaptiveParameters, ExitJournal, TunerConfig};
use async_trait::async_trait;
use chrono::Duration;
use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use trading_core::clock::Clock;
use trading_core::framework::Cycle;

pub struct AdaptiveTuner {
    store: Arc<ParameterStore>,
    journal: Arc<ExitJournal>,
    cfg: TunerConfig,
    clock: Arc<dyn Clock>,
}

impl AdaptiveTuner {
    pub fn new(
        store: Arc<ParameterStore>,
        journal: Arc<ExitJournal>,
        cfg: TunerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            journal,
            cfg,
            clock,
        }
    }

    /// Average outcome score per instrument over the trailing window.
    pub fn scores(&self) -> BTreeMap<String, f64> {
        let cutoff = self.clock.now() - Duration::hours(self.cfg.window_hours);
        let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for event in self.journal.since(cutoff) {
            let entry = sums.entry(event.instrument).or_insert((0.0, 0));
            entry.0 += event.kind.score();
            entry.1 += 1;
        }
        sums.into_iter()
            .map(|(inst, (sum, n))| (inst, sum / n as f64))
            .collect()
    }

    /// One tuning pass. Returns the changes that were persisted.
    pub fn tune(&self) -> Vec<ParameterChange> {
        let now = self.clock.now();
        let mut changes = Vec::new();
        for (instrument, score) in self.scores() {
            let cfg = &self.cfg;
            let reason = format!("score {:.3}", score);
            let result = self.store.update(&instrument, &reason, now, |p| {
                adjust(p, score, cfg);
            });
            match result {
                Ok(Some(change)) => {
                    info!(
                        "Tuned {} ({}): band {:.2} -> {:.2}, tp {:.2} -> {:.2}",
                        instrument,
                        reason,
                        change.before.band_multiplier,
                        change.after.band_multiplier,
                        change.before.tp_multiplier,
                        change.after.tp_multiplier
                    );
                    changes.push(change);
                }
                Ok(None) => {}
                Err(e) => warn!("Tuning {} skipped: {}", instrument, e),
            }
        }
        changes
    }
}

/// Applies one tuning step for `score` and clamps to the bounds.
pub fn adjust(params: &mut AdaptiveParameters, score: f64, cfg: &TunerConfig) {
    if score > cfg.high_threshold {
        params.band_multiplier -= cfg.band_step;
        params.tp_multiplier += cfg.tp_step;
    } else if score < cfg.low_threshold {
        params.band_multiplier += cfg.band_step;
        params.tp_multiplier -= cfg.tp_step;
    }
    params.band_multiplier = round4(params.band_multiplier.clamp(cfg.band_min, cfg.band_max));
    params.tp_multiplier = round4(params.tp_multiplier.clamp(cfg.tp_min, cfg.tp_max));
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

#[async_trait]
impl Cycle for AdaptiveTuner {
    fn name(&self) -> &str {
        "adaptive-tuner"
    }

    async fn run_cycle(&mut self) {
        let changes = self.tune();
        info!("Tuning pass complete: {} instruments changed", changes.len());
    }
}
