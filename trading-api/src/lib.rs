//! # Trading API
//!
//! Shared vocabulary between the execution engine and its collaborators.
//!
//! ## Modules
//! - `model`: instruments, price snapshots, signals, orders and the broker's
//!   view of live trades, positions and pending orders.
//! - `traits`: the collaborator contracts (`Broker`, `Notifier`, `NewsFeed`).
//! - `error`: failures reported by collaborators.

pub mod error;
pub mod model;
pub mod traits;

pub use error::BrokerError;
pub use model::execution::{OpenPosition, OpenTrade, PendingOrder, PendingOrderKind};
pub use model::identity::AccountId;
pub use model::instrument::{InstrumentClass, InstrumentConfig};
pub use model::market_data::{Candle, PriceSnapshot};
pub use model::order::{Fill, OrderRequest, OrderType, SubmitOutcome};
pub use model::sentiment::{NewsEvent, SentimentSnapshot};
pub use model::signal::{Side, Signal};
pub use traits::broker::Broker;
pub use traits::news::NewsFeed;
pub use traits::notifier::Notifier;

pub mod prelude {
    pub use crate::model::instrument::InstrumentConfig;
    pub use crate::model::market_data::PriceSnapshot;
    pub use crate::model::signal::{Side, Signal};
    pub use crate::traits::broker::Broker;
}
