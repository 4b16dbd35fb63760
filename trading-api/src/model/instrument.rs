use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad family an instrument belongs to.
///
/// The class drives the few places where instruments are treated
/// differently: the metal session/spike rules and the conversion of a
/// profit estimate into account currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentClass {
    /// Currency pair quoted in the account currency (e.g. EUR_USD).
    #[default]
    Fx,
    /// Currency pair quoted in yen (e.g. USD_JPY).
    JpyFx,
    /// Precious metal (e.g. XAU_USD). Higher volatility class.
    Metal,
}

impl InstrumentClass {
    /// Instruments subject to session windows and spike cooldowns.
    pub fn is_high_volatility(&self) -> bool {
        matches!(self, InstrumentClass::Metal)
    }
}

impl fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstrumentClass::Fx => "fx",
            InstrumentClass::JpyFx => "jpy_fx",
            InstrumentClass::Metal => "metal",
        };
        write!(f, "{}", name)
    }
}

/// Static description of a tradeable instrument. Immutable per deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Broker symbol, e.g. "EUR_USD".
    pub symbol: String,
    #[serde(default)]
    pub class: InstrumentClass,
    /// Number of decimals the broker accepts for prices.
    pub precision: u32,
    /// Widest spread (absolute price units) accepted inside the liquid session.
    pub max_spread: f64,
    /// Maximum number of live positions + pending entries on this symbol.
    pub max_positions: usize,
    /// Largest order size in units.
    pub max_order_size: u64,
    /// Smallest stop distance a signal may carry.
    #[serde(default)]
    pub min_stop_distance: f64,
    /// Smallest take-profit distance a signal may carry.
    #[serde(default)]
    pub min_target_distance: f64,
}

impl InstrumentConfig {
    pub fn new(
        symbol: impl Into<String>,
        class: InstrumentClass,
        precision: u32,
        max_spread: f64,
        max_positions: usize,
        max_order_size: u64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            class,
            precision,
            max_spread,
            max_positions,
            max_order_size,
            min_stop_distance: 0.0,
            min_target_distance: 0.0,
        }
    }

    pub fn with_floors(mut self, min_stop_distance: f64, min_target_distance: f64) -> Self {
        self.min_stop_distance = min_stop_distance;
        self.min_target_distance = min_target_distance;
        self
    }

    /// Rounds a price to the instrument's display precision.
    pub fn round_price(&self, price: f64) -> f64 {
        let factor = 10f64.powi(self.precision as i32);
        (price * factor).round() / factor
    }

    /// Formats a price the way the broker expects it on the wire.
    pub fn format_price(&self, price: f64) -> String {
        format!("{:.*}", self.precision as usize, price)
    }
}
