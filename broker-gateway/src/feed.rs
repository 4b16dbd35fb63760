//! Random-walk market data for paper runs.

use crate::paper::PaperBroker;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trading::{Candle, PriceSnapshot};

#[derive(Debug, Clone)]
struct WalkingInstrument {
    symbol: String,
    mid: f64,
    spread: f64,
    /// Largest relative move per step, e.g. 0.0005 for 5 bps.
    step: f64,
}

/// Random walk over a set of instruments. Each step moves every mid by up
/// to `±step`, appends a candle and publishes a fresh quote to the broker.
pub struct SyntheticFeed {
    instruments: Vec<WalkingInstrument>,
    rng: StdRng,
}

impl SyntheticFeed {
    pub fn new(seed: u64) -> Self {
        Self {
            instruments: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn with_instrument(
        mut self,
        symbol: &str,
        start_mid: f64,
        spread: f64,
        step: f64,
    ) -> Self {
        self.instruments.push(WalkingInstrument {
            symbol: symbol.to_string(),
            mid: start_mid,
            spread,
            step,
        });
        self
    }

    pub fn symbols(&self) -> Vec<String> {
        self.instruments.iter().map(|i| i.symbol.clone()).collect()
    }

    /// Advances every instrument one bar ending at `at`.
    pub fn step(&mut self, broker: &PaperBroker, at: DateTime<Utc>) {
        for inst in &mut self.instruments {
            let open = inst.mid;
            let change: f64 = self.rng.gen_range(-inst.step..=inst.step);
            // Keep the price positive
            inst.mid = (open * (1.0 + change)).max(inst.spread * 10.0);

            let wick = open.max(inst.mid) * inst.step * 0.25;
            broker.push_candle(
                &inst.symbol,
                Candle::new(
                    at,
                    open,
                    open.max(inst.mid) + wick,
                    open.min(inst.mid) - wick,
                    inst.mid,
                ),
            );
            let half = inst.spread / 2.0;
            broker.set_quote(PriceSnapshot::new(
                &inst.symbol,
                inst.mid - half,
                inst.mid + half,
                true,
                at,
            ));
        }
    }

    /// Generates `bars` bars of history ending at `end`, one per `interval`.
    pub fn warm_up(
        &mut self,
        broker: &PaperBroker,
        bars: usize,
        end: DateTime<Utc>,
        interval: Duration,
    ) {
        for i in (0..bars).rev() {
            let at = end - interval * i as i32;
            self.step(broker, at);
        }
    }
}
