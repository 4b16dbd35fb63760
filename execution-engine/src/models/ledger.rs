//! Journal of partial and full exits.
//!
//! Every exit the lifecycle manager executes is recorded here; the adaptive
//! tuner reads the trailing window back to score each instrument.

use chrono::{DateTime, Duration, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use trading::AccountId;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitKind {
    Partial25,
    Partial50,
    FullExit,
}

impl ExitKind {
    /// Outcome score used by the tuner.
    pub fn score(&self) -> f64 {
        match self {
            ExitKind::Partial25 => 0.25,
            ExitKind::Partial50 => 0.50,
            ExitKind::FullExit => 1.00,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitEvent {
    pub id: Uuid,
    pub account: AccountId,
    pub instrument: String,
    pub trade_id: String,
    pub kind: ExitKind,
    pub units: u64,
    pub r_multiple: f64,
    pub timestamp: DateTime<Utc>,
}

impl ExitEvent {
    pub fn new(
        account: AccountId,
        instrument: impl Into<String>,
        trade_id: impl Into<String>,
        kind: ExitKind,
        units: u64,
        r_multiple: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account,
            instrument: instrument.into(),
            trade_id: trade_id.into(),
            kind,
            units,
            r_multiple,
            timestamp,
        }
    }
}

/// CSV mirror of the exit journal under the data directory.
pub const EXIT_JOURNAL_FILE: &str = "exit_events.csv";

/// Trailing in-memory window of exit events shared by all accounts,
/// optionally mirrored to a CSV file.
pub struct ExitJournal {
    events: Mutex<VecDeque<ExitEvent>>,
    retention: Duration,
    csv_path: Option<PathBuf>,
}

impl ExitJournal {
    pub fn new(retention: Duration) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            retention,
            csv_path: None,
        }
    }

    pub fn with_csv(mut self, path: PathBuf) -> Self {
        self.csv_path = Some(path);
        self
    }

    pub fn record(&self, event: ExitEvent) {
        if let Err(e) = self.append_csv(&event) {
            error!("Failed to mirror exit event {} to CSV: {}", event.id, e);
        }

        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let cutoff = event.timestamp - self.retention;
        while events.front().is_some_and(|e| e.timestamp < cutoff) {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Events at or after `cutoff`, oldest first.
    pub fn since(&self, cutoff: DateTime<Utc>) -> Vec<ExitEvent> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn append_csv(&self, event: &ExitEvent) -> std::io::Result<()> {
        let Some(path) = &self.csv_path else {
            return Ok(());
        };
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        // Format: Date, Account, Instrument, Trade, Kind, Units, R, EventID
        writeln!(
            file,
            "{},{},{},{},{:?},{},{:.3},{}",
            event.timestamp.to_rfc3339(),
            event.account,
            event.instrument,
            event.trade_id,
            event.kind,
            event.units,
            event.r_multiple,
            event.id
        )
    }
}
