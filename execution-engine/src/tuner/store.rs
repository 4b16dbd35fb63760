//! Shared store of per-instrument adaptive parameters.
//!
//! Every read-modify-write happens under one mutex and is flushed to disk
//! before the lock is released. Each change is also appended to an audit
//! log so parameter drift can be reconstructed.

use crate::error::{EngineError, Result};
use crate::models::AdaptiveParameters;
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use trading_core::fs::{append_json_line, load_state_or_default, save_state};

pub const PARAMS_FILE: &str = "adaptive_params.json";
pub const AUDIT_FILE: &str = "adaptive_params.log";

/// One audited parameter change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterChange {
    pub instrument: String,
    pub before: AdaptiveParameters,
    pub after: AdaptiveParameters,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
struct StorePaths {
    state: PathBuf,
    audit: PathBuf,
}

pub struct ParameterStore {
    defaults: AdaptiveParameters,
    records: Mutex<BTreeMap<String, AdaptiveParameters>>,
    paths: Option<StorePaths>,
}

impl ParameterStore {
    /// Opens the store under `data_dir`. Missing or corrupt files yield the
    /// defaults.
    pub fn open(data_dir: &Path, defaults: AdaptiveParameters) -> Self {
        let state = data_dir.join(PARAMS_FILE);
        let records: BTreeMap<String, AdaptiveParameters> =
            load_state_or_default(&state, BTreeMap::new);
        info!(
            "Loaded adaptive parameters for {} instruments from {}",
            records.len(),
            state.display()
        );
        Self {
            defaults,
            records: Mutex::new(records),
            paths: Some(StorePaths {
                state,
                audit: data_dir.join(AUDIT_FILE),
            }),
        }
    }

    /// A store that never touches disk.
    pub fn in_memory(defaults: AdaptiveParameters) -> Self {
        Self {
            defaults,
            records: Mutex::new(BTreeMap::new()),
            paths: None,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, AdaptiveParameters>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, instrument: &str) -> AdaptiveParameters {
        self.lock().get(instrument).copied().unwrap_or(self.defaults)
    }

    pub fn snapshot(&self) -> BTreeMap<String, AdaptiveParameters> {
        self.lock().clone()
    }

    /// Applies `mutate` to `instrument`'s record. When the record changes it
    /// is persisted and audited before the lock is released; a failed flush
    /// rolls the change back.
    pub fn update<F>(
        &self,
        instrument: &str,
        reason: &str,
        now: DateTime<Utc>,
        mutate: F,
    ) -> Result<Option<ParameterChange>>
    where
        F: FnOnce(&mut AdaptiveParameters),
    {
        let mut records = self.lock();
        let before = records.get(instrument).copied().unwrap_or(self.defaults);
        let mut after = before;
        mutate(&mut after);
        if after == before {
            return Ok(None);
        }

        let previous = records.insert(instrument.to_string(), after);
        let change = ParameterChange {
            instrument: instrument.to_string(),
            before,
            after,
            reason: reason.to_string(),
            timestamp: now,
        };

        if let Some(paths) = &self.paths {
            if let Err(e) = save_state(&paths.state, &*records) {
                match previous {
                    Some(p) => records.insert(instrument.to_string(), p),
                    None => records.remove(instrument),
                };
                error!("Failed to persist parameters for {}: {:#}", instrument, e);
                return Err(EngineError::Persistence(format!("{:#}", e)));
            }
            if let Err(e) = append_json_line(&paths.audit, &change) {
                error!("Failed to audit parameter change for {}: {:#}", instrument, e);
            }
        }
        Ok(Some(change))
    }
}
