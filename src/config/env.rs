//! Environment overrides.
//!
//! `TASKPULSE_*` variables win over file values. Durations are whole seconds
//! and clamp to at least one second.

use crate::error::ConfigError;

use super::Config;

pub(super) fn apply_env_overrides<FEnv>(config: &mut Config, env_lookup: &FEnv) -> Result<(), ConfigError>
where
    FEnv: Fn(&str) -> Option<String>,
{
    let progress = &mut config.progress;
    for (name, slot) in [
        ("TASKPULSE_FLUSH_INTERVAL_SECS", &mut progress.flush_interval_secs),
        (
            "TASKPULSE_CODING_FLUSH_INTERVAL_SECS",
            &mut progress.coding_flush_interval_secs,
        ),
        ("TASKPULSE_FLUSH_WINDOW_SECS", &mut progress.flush_window_secs),
        ("TASKPULSE_POLL_INTERVAL_SECS", &mut progress.poll_interval_secs),
        ("TASKPULSE_MAX_LIFETIME_SECS", &mut progress.max_lifetime_secs),
    ] {
        if let Some(secs) = seconds_override(env_lookup, name)? {
            *slot = secs;
        }
    }
    if let Some(dir) = env_lookup("TASKPULSE_STORE_DIR") {
        config.store.dir = dir.trim().to_string();
    }
    if let Some(filter) = env_lookup("TASKPULSE_LOG").filter(|f| !f.trim().is_empty()) {
        config.logging.filter = filter.trim().to_string();
    }
    Ok(())
}

fn seconds_override<FEnv>(env_lookup: &FEnv, name: &str) -> Result<Option<u64>, ConfigError>
where
    FEnv: Fn(&str) -> Option<String>,
{
    let Some(raw) = env_lookup(name) else {
        return Ok(None);
    };
    let parsed = raw.trim().parse::<u64>().map_err(|_| {
        ConfigError::Invalid(format!(
            "invalid {name} value `{raw}`: expected positive integer seconds"
        ))
    })?;
    // Zero would mean "tick continuously"; clamp like the file validator.
    Ok(Some(parsed.max(1)))
}
