//! Command handlers, one module per subcommand.

pub mod catalog;
pub mod completion;
pub mod config_cmd;
pub mod expand;
pub mod plan;
pub mod render;
pub mod validate;
pub mod version;
