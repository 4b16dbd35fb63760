use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;

/// Per-account risk bookkeeping. Owned and mutated only by that account's
/// pipeline.
#[derive(Debug, Clone)]
pub struct RiskState {
    trading_enabled: bool,
    daily_trades: u32,
    last_reset: NaiveDate,
    halt_until: Option<DateTime<Utc>>,
    throttle_until: Option<DateTime<Utc>>,
    base_risk_fraction: f64,
    current_risk_fraction: f64,
    instrument_halts: HashMap<String, DateTime<Utc>>,
}

impl RiskState {
    pub fn new(base_risk_fraction: f64, now: DateTime<Utc>) -> Self {
        Self {
            trading_enabled: true,
            daily_trades: 0,
            last_reset: now.date_naive(),
            halt_until: None,
            throttle_until: None,
            base_risk_fraction,
            current_risk_fraction: base_risk_fraction,
            instrument_halts: HashMap::new(),
        }
    }

    /// Resets the daily counters when `now` falls on a later UTC day than the
    /// last reset. Returns true if a reset happened.
    pub fn roll_day(&mut self, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        if today <= self.last_reset {
            return false;
        }
        self.last_reset = today;
        self.daily_trades = 0;
        self.current_risk_fraction = self.base_risk_fraction;
        true
    }

    /// Counts a confirmed fill against the daily cap.
    pub fn record_fill(&mut self) {
        self.daily_trades = self.daily_trades.saturating_add(1);
    }

    pub fn daily_trades(&self) -> u32 {
        self.daily_trades
    }

    pub fn last_reset(&self) -> NaiveDate {
        self.last_reset
    }

    pub fn trading_enabled(&self) -> bool {
        self.trading_enabled
    }

    pub fn set_trading_enabled(&mut self, enabled: bool) {
        self.trading_enabled = enabled;
    }

    pub fn halt_until(&self) -> Option<DateTime<Utc>> {
        self.halt_until
    }

    pub fn throttle_until(&self) -> Option<DateTime<Utc>> {
        self.throttle_until
    }

    /// Extends the account-wide halt; never shortens an existing one.
    pub fn extend_halt(&mut self, until: DateTime<Utc>) {
        self.halt_until = Some(self.halt_until.map_or(until, |h| h.max(until)));
    }

    pub fn set_throttle(&mut self, until: DateTime<Utc>) {
        self.throttle_until = Some(until);
    }

    /// True while a halt or throttle window covers `now`.
    pub fn in_halt_window(&self, now: DateTime<Utc>) -> bool {
        self.halt_until.is_some_and(|h| now < h) || self.throttle_until.is_some_and(|t| now < t)
    }

    /// Excludes one instrument until `until`. Returns true if the instrument
    /// was not already halted, so callers alert only once.
    pub fn halt_instrument(
        &mut self,
        symbol: &str,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        let already = self.instrument_halted(symbol, now);
        if !already {
            self.instrument_halts.insert(symbol.to_string(), until);
        }
        !already
    }

    pub fn instrument_halted(&self, symbol: &str, now: DateTime<Utc>) -> bool {
        self.instrument_halts.get(symbol).is_some_and(|until| now < *until)
    }

    pub fn base_risk_fraction(&self) -> f64 {
        self.base_risk_fraction
    }

    pub fn current_risk_fraction(&self) -> f64 {
        self.current_risk_fraction
    }

    /// Operator override for the rest of the UTC day.
    pub fn set_risk_fraction(&mut self, fraction: f64) {
        self.current_risk_fraction = fraction;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_daily_reset_happens_once_per_boundary() {
        let mut state = RiskState::new(0.01, t(3, 10));
        state.record_fill();
        state.record_fill();
        assert!(!state.roll_day(t(3, 23)));
        assert_eq!(state.daily_trades(), 2);

        assert!(state.roll_day(t(4, 0)));
        assert_eq!(state.daily_trades(), 0);
        state.record_fill();
        assert!(!state.roll_day(t(4, 5)));
        assert_eq!(state.daily_trades(), 1);

        // Skipping days still resets exactly once.
        assert!(state.roll_day(t(7, 1)));
        assert!(!state.roll_day(t(7, 2)));
    }

    #[test]
    fn test_risk_override_reverts_next_day() {
        let mut state = RiskState::new(0.01, t(3, 10));
        state.set_risk_fraction(0.002);
        assert_eq!(state.current_risk_fraction(), 0.002);
        state.roll_day(t(4, 1));
        assert_eq!(state.current_risk_fraction(), 0.01);
    }

    #[test]
    fn test_halt_never_shortens() {
        let mut state = RiskState::new(0.01, t(3, 10));
        state.extend_halt(t(3, 12));
        state.extend_halt(t(3, 11));
        assert_eq!(state.halt_until(), Some(t(3, 12)));
        assert!(state.in_halt_window(t(3, 11)));
        assert!(!state.in_halt_window(t(3, 12)));
    }

    #[test]
    fn test_instrument_halt_reports_first_time_only() {
        let now = t(3, 10);
        let mut state = RiskState::new(0.01, now);
        assert!(state.halt_instrument("EUR_USD", now + Duration::minutes(5), now));
        assert!(!state.halt_instrument("EUR_USD", now + Duration::minutes(5), now));
        assert!(state.instrument_halted("EUR_USD", now + Duration::minutes(4)));
        assert!(!state.instrument_halted("EUR_USD", now + Duration::minutes(5)));

        let later = now + Duration::minutes(6);
        assert!(state.halt_instrument("EUR_USD", later + Duration::minutes(5), later));
    }
}
