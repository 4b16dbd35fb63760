//! # Trading Core Library
//!
//! Shared infrastructure for the execution engine and its tooling.
//!
//! ## Modules
//! - `admin`: Operator commands and the inbox they arrive through.
//! - `args`: Standardized argument parsing.
//! - `clock`: Injectable wall clock (system and manual).
//! - `framework`: Cooperative interval runner and shutdown signalling.
//! - `fs`: Atomic state persistence and append-only audit logs.

pub mod admin;
pub mod args;
pub mod clock;
pub mod framework;
pub mod fs;
