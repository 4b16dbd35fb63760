pub mod execution;
pub mod identity;
pub mod instrument;
pub mod market_data;
pub mod order;
pub mod sentiment;
pub mod signal;
