use super::params::AdaptiveParameters;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use trading::{AccountId, InstrumentConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),
    #[error("No accounts configured")]
    NoAccounts,
    #[error("No instruments configured")]
    NoInstruments,
    #[error("Account at position {0} has an empty id")]
    MissingAccountId(usize),
    #[error("Duplicate account id '{0}'")]
    DuplicateAccount(String),
    #[error("Account '{0}' has no usable API credential")]
    MissingCredential(String),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        reason: reason.into(),
    }
}

/// Root of the engine configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: RuntimeConfig,
    pub accounts: Vec<AccountConfig>,
    pub instruments: Vec<InstrumentConfig>,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub exits: ExitConfig,
    #[serde(default)]
    pub tuner: TunerConfig,
    #[serde(default)]
    pub news: NewsConfig,
    /// Parameters used for any instrument missing from the persisted store.
    #[serde(default)]
    pub defaults: AdaptiveParameters,
}

impl EngineConfig {
    /// Loads the file at `path`, then applies `ENGINE__SECTION__KEY`
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("ENGINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(contents, config::FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Startup checks. Any failure here is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accounts.is_empty() {
            return Err(ConfigError::NoAccounts);
        }
        if self.instruments.is_empty() {
            return Err(ConfigError::NoInstruments);
        }

        let mut seen = HashSet::new();
        for (idx, account) in self.accounts.iter().enumerate() {
            if account.id.trim().is_empty() {
                return Err(ConfigError::MissingAccountId(idx));
            }
            if !seen.insert(account.id.as_str()) {
                return Err(ConfigError::DuplicateAccount(account.id.clone()));
            }
            account.credential()?;
            if !(account.risk_fraction > 0.0 && account.risk_fraction <= 0.05) {
                return Err(invalid(
                    format!("accounts.{}.risk_fraction", account.id),
                    "must be in (0, 0.05]",
                ));
            }
            if account.limits.concurrent_cap == 0 {
                return Err(invalid(
                    format!("accounts.{}.limits.concurrent_cap", account.id),
                    "must be at least 1",
                ));
            }
        }

        for inst in &self.instruments {
            if inst.symbol.is_empty() || inst.max_order_size == 0 || inst.max_spread <= 0.0 {
                return Err(invalid(
                    format!("instruments.{}", inst.symbol),
                    "needs a symbol, a positive max_spread and max_order_size",
                ));
            }
        }

        let t = &self.tuner;
        if t.band_min > t.band_max {
            return Err(invalid("tuner.band_min", "must not exceed tuner.band_max"));
        }
        if t.tp_min > t.tp_max {
            return Err(invalid("tuner.tp_min", "must not exceed tuner.tp_max"));
        }
        if t.low_threshold > t.high_threshold {
            return Err(invalid(
                "tuner.low_threshold",
                "must not exceed tuner.high_threshold",
            ));
        }

        if self.defaults.avg_period == 0 || self.defaults.vol_period == 0 {
            return Err(invalid("defaults", "periods must be positive"));
        }

        Ok(())
    }

    pub fn instrument(&self, symbol: &str) -> Option<&InstrumentConfig> {
        self.instruments.iter().find(|i| i.symbol == symbol)
    }

    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        self.engine.data_dir = data_dir;
        self
    }
}

/// Scheduling, timeouts and data-quality thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub cycle_secs: u64,
    pub tuner_secs: u64,
    pub command_poll_secs: u64,
    pub call_timeout_secs: u64,
    pub data_dir: PathBuf,
    /// Number of candles requested per instrument each cycle.
    pub price_window: usize,
    pub stale_after_secs: i64,
    pub untradeable_grace_secs: i64,
    pub stale_halt_minutes: i64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cycle_secs: 60,
            tuner_secs: 1800,
            command_poll_secs: 2,
            call_timeout_secs: 10,
            data_dir: PathBuf::from("data"),
            price_window: 200,
            stale_after_secs: 30,
            untradeable_grace_secs: 120,
            stale_halt_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryOrder {
    #[default]
    Market,
    /// Rest a limit order at the signal's entry price.
    Limit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub id: String,
    #[serde(default)]
    pub api_token: Option<String>,
    /// Name of an environment variable holding the token.
    #[serde(default)]
    pub api_token_env: Option<String>,
    #[serde(default = "default_risk_fraction")]
    pub risk_fraction: f64,
    #[serde(default = "default_size_multiplier")]
    pub size_multiplier: f64,
    #[serde(default)]
    pub limits: RiskLimits,
    #[serde(default)]
    pub entry_order: EntryOrder,
}

fn default_risk_fraction() -> f64 {
    0.01
}

fn default_size_multiplier() -> f64 {
    1.0
}

impl AccountConfig {
    pub fn new(id: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            api_token: Some(api_token.into()),
            api_token_env: None,
            risk_fraction: default_risk_fraction(),
            size_multiplier: default_size_multiplier(),
            limits: RiskLimits::default(),
            entry_order: EntryOrder::default(),
        }
    }

    pub fn account_id(&self) -> AccountId {
        AccountId::new(self.id.clone())
    }

    /// Resolves the API token, preferring the inline value.
    pub fn credential(&self) -> Result<String, ConfigError> {
        let inline = self
            .api_token
            .as_ref()
            .filter(|t| !t.trim().is_empty())
            .cloned();
        let from_env = || {
            self.api_token_env
                .as_ref()
                .and_then(|var| std::env::var(var).ok())
                .filter(|t| !t.trim().is_empty())
        };
        inline
            .or_else(from_env)
            .ok_or_else(|| ConfigError::MissingCredential(self.id.clone()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    pub daily_trade_cap: u32,
    pub concurrent_cap: usize,
    /// When open slots fall to this many, new entries must diversify.
    pub reserved_slots: usize,
    /// Unrealized R an existing position needs before a second one is allowed.
    pub second_position_min_r: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            daily_trade_cap: 10,
            concurrent_cap: 5,
            reserved_slots: 1,
            second_position_min_r: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Largest mid move since the previous cycle, as a fraction, before a
    /// signal in the same direction is treated as chasing.
    pub anti_chase_pct: f64,
    pub liquid_session_start_hour: u32,
    pub liquid_session_end_hour: u32,
    pub off_session_spread_factor: f64,
    pub metal_session_start_hour: u32,
    pub metal_session_end_hour: u32,
    pub min_confirmations: usize,
    pub spike_short_bars: usize,
    pub spike_long_bars: usize,
    pub spike_ratio: f64,
    pub spike_cooldown_minutes: i64,
    /// Period of the higher-timeframe filter average. Disabled when unset.
    pub htf_period: Option<usize>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            anti_chase_pct: 0.006,
            liquid_session_start_hour: 7,
            liquid_session_end_hour: 20,
            off_session_spread_factor: 1.5,
            metal_session_start_hour: 12,
            metal_session_end_hour: 20,
            min_confirmations: 2,
            spike_short_bars: 5,
            spike_long_bars: 20,
            spike_ratio: 1.5,
            spike_cooldown_minutes: 30,
            htf_period: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub min_expected_r: f64,
    /// Smallest profit at target worth trading, in account currency.
    pub min_profit: f64,
    /// Applied to units while an instrument is spiking.
    pub spike_reduction: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            min_expected_r: 0.5,
            min_profit: 5.0,
            spike_reduction: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitConfig {
    pub partial25_r: f64,
    pub partial50_r: f64,
    pub full_exit_r: f64,
    /// Bracket distances used when repairing a naked trade, as fractions of
    /// the entry price.
    pub fallback_stop_pct: f64,
    pub fallback_target_pct: f64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            partial25_r: 0.8,
            partial50_r: 1.0,
            full_exit_r: 1.5,
            fallback_stop_pct: 0.002,
            fallback_target_pct: 0.003,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub window_hours: i64,
    pub high_threshold: f64,
    pub low_threshold: f64,
    pub band_step: f64,
    pub tp_step: f64,
    pub band_min: f64,
    pub band_max: f64,
    pub tp_min: f64,
    pub tp_max: f64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            window_hours: 6,
            high_threshold: 0.6,
            low_threshold: 0.3,
            band_step: 0.05,
            tp_step: 0.1,
            band_min: 0.8,
            band_max: 2.5,
            tp_min: 1.0,
            tp_max: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub halt_lead_minutes: i64,
    pub halt_minutes: i64,
    pub sentiment_window_minutes: i64,
    pub min_samples: usize,
    pub throttle_score: f64,
    pub throttle_minutes: i64,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            halt_lead_minutes: 30,
            halt_minutes: 60,
            sentiment_window_minutes: 60,
            min_samples: 5,
            throttle_score: 0.6,
            throttle_minutes: 30,
        }
    }
}
