//! Settings for the `ej` command-line tool.
//!
//! This crate locates the settings file ([`discovery`]) and loads it, layered
//! with defaults and `EJ_*` environment variables ([`config`]).

pub mod config;
pub mod discovery;

pub use config::{ConfigError, Settings, load_settings};
pub use discovery::find_settings_file;
