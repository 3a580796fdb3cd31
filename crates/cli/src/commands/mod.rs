pub mod assemble;
pub mod config_cmd;
pub mod init;

use contextual_config::{AppConfig, ConfigError};
use std::path::Path;

/// Load from an explicit path, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    }
}
