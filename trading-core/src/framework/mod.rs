pub mod runner;

pub use runner::{run_every, Cycle, Shutdown};
