//! Configuration loading.
//!
//! Sources, highest precedence first:
//! 1. `--config <path>`
//! 2. `./taskpulse.toml`
//! 3. `$XDG_CONFIG_HOME/taskpulse/taskpulse.toml` (or `~/.config/...`)
//! 4. Built-in defaults
//!
//! `TASKPULSE_*` environment variables are applied on top of whichever file
//! won, then the result is validated.

mod defaults;
mod env;
mod sources;
mod types;

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub use defaults::DEFAULT_CONFIG_TEMPLATE;
pub use sources::config_root_dir;
pub use types::{Config, ConfigSource, LoadedConfig, LoggingConfig, ProgressConfig, StoreConfig};

use env::apply_env_overrides;
use sources::read_config_text_with_sources;

/// Load configuration from disk and environment.
///
/// `path_override` is an explicit config file path (from --config flag).
pub fn load_config(path_override: Option<&str>) -> Result<Config, ConfigError> {
    Ok(load_config_with_source(path_override)?.config)
}

/// Load configuration and report which file it came from.
pub fn load_config_with_source(path_override: Option<&str>) -> Result<LoadedConfig, ConfigError> {
    load_config_from_sources(
        path_override,
        |path| std::fs::read_to_string(path),
        |name| std::env::var(name).ok(),
        config_root_dir,
    )
}

fn load_config_from_sources<FRead, FEnv, FRoot>(
    path_override: Option<&str>,
    read_file: FRead,
    env_lookup: FEnv,
    config_root: FRoot,
) -> Result<LoadedConfig, ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FEnv: Fn(&str) -> Option<String>,
    FRoot: Fn() -> Option<PathBuf>,
{
    let (config_text, source) =
        read_config_text_with_sources(path_override, &read_file, &config_root)?;
    let mut config: Config = toml::from_str(&config_text)?;
    apply_env_overrides(&mut config, &env_lookup)?;
    validate(&mut config)?;
    Ok(LoadedConfig { config, source })
}

/// Normalize values that would otherwise stall or spin the listener.
fn validate(config: &mut Config) -> Result<(), ConfigError> {
    let progress = &mut config.progress;
    for secs in [
        &mut progress.flush_interval_secs,
        &mut progress.coding_flush_interval_secs,
        &mut progress.flush_window_secs,
        &mut progress.poll_interval_secs,
        &mut progress.max_lifetime_secs,
        &mut progress.io_timeout_secs,
    ] {
        *secs = (*secs).max(1);
    }
    progress.coding_agent_types = progress
        .coding_agent_types
        .iter()
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    if config.store.retention_hours == 0 {
        return Err(ConfigError::Invalid(
            "store.retention_hours must be at least 1".to_string(),
        ));
    }
    if config.store.max_tasks_per_chat == 0 {
        return Err(ConfigError::Invalid(
            "store.max_tasks_per_chat must be at least 1".to_string(),
        ));
    }
    if config.logging.filter.trim().is_empty() {
        config.logging.filter = LoggingConfig::default().filter;
    }
    Ok(())
}

/// Store directory resolved against the working directory, or `None` for an
/// in-memory store.
pub fn store_dir(config: &StoreConfig) -> Option<PathBuf> {
    let dir = config.dir.trim();
    (!dir.is_empty()).then(|| PathBuf::from(dir))
}
