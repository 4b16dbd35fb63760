pub mod admin;

pub use admin::{forward_json_lines, CommandPoller};
