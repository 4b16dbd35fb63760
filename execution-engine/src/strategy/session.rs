use chrono::{DateTime, Timelike, Utc};
use trading::InstrumentConfig;

/// Half-open `[start_hour, end_hour)` window in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl SessionWindow {
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let hour = at.hour();
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            // Wraps midnight.
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// Spread allowance for `instrument` at `at`: the configured maximum inside
/// the liquid session, widened by `off_session_factor` outside it.
pub fn allowed_spread(
    instrument: &InstrumentConfig,
    liquid: SessionWindow,
    off_session_factor: f64,
    at: DateTime<Utc>,
) -> f64 {
    if liquid.contains(at) {
        instrument.max_spread
    } else {
        instrument.max_spread * off_session_factor
    }
}
