// Configuration management module
// Explicit, TOML-backed settings handed to each component at construction
// time; nothing is read from ambient globals at call sites.

pub mod settings;


pub use settings::{
    ChunkingConfig, Config, ConfigError, ProviderBackend, ProviderConfig, UsageLimits,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
