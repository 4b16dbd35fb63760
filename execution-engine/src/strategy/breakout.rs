use super::session::{allowed_spread, SessionWindow};
use super::{MarketView, Strategy};
use crate::models::SignalConfig;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use std::collections::HashMap;
use trading::{Side, Signal};

pub const STRATEGY_TAG: &str = "breakout";

/// Volatility-band breakout.
///
/// BUY when the mid clears the upper band with enough confirming closes and
/// a rising slope (and sits above the higher-timeframe average if one is
/// configured). SELL mirrors it against the lower band.
pub struct BreakoutStrategy {
    cfg: SignalConfig,
    liquid_session: SessionWindow,
    metal_session: SessionWindow,
    last_spike: HashMap<String, DateTime<Utc>>,
}

impl BreakoutStrategy {
    pub fn new(cfg: SignalConfig) -> Self {
        Self {
            liquid_session: SessionWindow::new(
                cfg.liquid_session_start_hour,
                cfg.liquid_session_end_hour,
            ),
            metal_session: SessionWindow::new(
                cfg.metal_session_start_hour,
                cfg.metal_session_end_hour,
            ),
            cfg,
            last_spike: HashMap::new(),
        }
    }

    /// Metal-class gate: session window plus post-spike cooldown.
    fn high_volatility_blocked(&mut self, view: &MarketView<'_>) -> bool {
        let symbol = &view.instrument.symbol;
        if view.indicators.volatility_spike {
            self.last_spike.insert(symbol.clone(), view.now);
        }
        if !self.metal_session.contains(view.now) {
            debug!("{} outside its trading session", symbol);
            return true;
        }
        if let Some(spiked_at) = self.last_spike.get(symbol) {
            let cooldown = Duration::minutes(self.cfg.spike_cooldown_minutes);
            if view.now < *spiked_at + cooldown {
                info!(
                    "{} in spike cooldown until {}",
                    symbol,
                    *spiked_at + cooldown
                );
                return true;
            }
        }
        false
    }

    fn is_chasing(&self, side: Side, mid: f64, previous_mid: Option<f64>) -> bool {
        let Some(prev) = previous_mid.filter(|p| *p > 0.0) else {
            return false;
        };
        let jump = (mid - prev) / prev * side.direction();
        jump > self.cfg.anti_chase_pct
    }
}

impl Strategy for BreakoutStrategy {
    fn name(&self) -> &str {
        STRATEGY_TAG
    }

    fn evaluate(&mut self, view: &MarketView<'_>) -> Vec<Signal> {
        let ind = view.indicators;
        let symbol = &view.instrument.symbol;
        let snapshot = view.snapshot;

        let max_spread = allowed_spread(
            view.instrument,
            self.liquid_session,
            self.cfg.off_session_spread_factor,
            view.now,
        );
        if snapshot.spread() > max_spread {
            debug!(
                "{} spread {:.6} above allowance {:.6}",
                symbol,
                snapshot.spread(),
                max_spread
            );
            return Vec::new();
        }

        if view.instrument.class.is_high_volatility() && self.high_volatility_blocked(view) {
            return Vec::new();
        }

        if !ind.is_ready() {
            return Vec::new();
        }

        let mid = snapshot.mid();
        let min_conf = self.cfg.min_confirmations;

        let side = if mid > ind.upper
            && ind.confirm_above >= min_conf
            && ind.slope_up
            && ind.htf_average.map_or(true, |h| mid > h)
        {
            Side::Buy
        } else if mid < ind.lower
            && ind.confirm_below >= min_conf
            && ind.slope_down
            && ind.htf_average.map_or(true, |h| mid < h)
        {
            Side::Sell
        } else {
            return Vec::new();
        };

        if self.is_chasing(side, mid, view.previous_mid) {
            info!("{} {} suppressed: price jumped too far since last cycle", symbol, side);
            return Vec::new();
        }

        let stop_distance =
            (view.params.sl_multiplier * ind.volatility).max(view.instrument.min_stop_distance);
        let target_distance =
            (view.params.tp_multiplier * ind.volatility).max(view.instrument.min_target_distance);

        let (confirmations, excess) = match side {
            Side::Buy => (ind.confirm_above, mid - ind.upper),
            Side::Sell => (ind.confirm_below, ind.lower - mid),
        };
        let confidence = (0.5
            + 0.25 * (confirmations as f64 - 2.0)
            + 0.25 * (excess / ind.volatility).min(1.0))
        .clamp(0.0, 1.0);

        let dir = side.direction();
        vec![Signal::new(
            symbol.clone(),
            side,
            mid,
            mid - dir * stop_distance,
            mid + dir * target_distance,
            confidence,
            STRATEGY_TAG,
        )]
    }
}
