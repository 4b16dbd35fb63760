pub mod config;
pub mod ledger;
pub mod params;

pub use config::*;
pub use ledger::*;
pub use params::*;
