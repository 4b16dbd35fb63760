pub mod persistence;

pub use persistence::{append_json_line, load_state, load_state_or_default, save_state};
