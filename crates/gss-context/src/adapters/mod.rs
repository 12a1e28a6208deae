//! # Adapters
//!
//! Outbound port implementations backed by the outside world.
//!
//! - `TomlConfigProvider` - manager settings from a TOML file

pub mod config;

pub use config::{ConfigError, TomlConfigProvider};
