pub mod config;
pub mod providers;
pub mod query;
pub mod utils;

pub use config::{handle_config_command, ConfigCommands};
pub use providers::{handle_providers_command, ProvidersCommands};
