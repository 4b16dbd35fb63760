//! # Broker Gateway
//!
//! Broker-side collaborators used for paper trading and tests.
//!
//! ## Modules
//! - `paper`: in-memory `PaperBroker` implementing `trading::Broker`.
//! - `feed`: random-walk `SyntheticFeed` that drives a `PaperBroker`.
//! - `notify`: `LogNotifier`, a `Notifier` that writes alerts to the log.

pub mod feed;
pub mod notify;
pub mod paper;

pub use feed::SyntheticFeed;
pub use notify::LogNotifier;
pub use paper::PaperBroker;
