pub mod config;
pub mod types;

pub use config::{RelayConfig, parse_duration};
pub use types::*;
