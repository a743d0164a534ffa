//! Compile-time build metadata exposed to the CLI.

/// Semver package version from `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// VCS commit hash captured at build time.
pub const GIT_COMMIT: &str = env!("TASKPULSE_BUILD_GIT_HASH");

/// Build timestamp captured at compile time.
pub const BUILD_TIMESTAMP: &str = env!("TASKPULSE_BUILD_TIMESTAMP");

/// Body of `taskpulse --version`.
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("TASKPULSE_BUILD_GIT_HASH"),
    "\nbuilt: ",
    env!("TASKPULSE_BUILD_TIMESTAMP")
);

/// Help trailer block that surfaces build metadata in `taskpulse --help`.
pub const HELP_BUILD_METADATA: &str = concat!(
    "Build metadata:\n  commit: ",
    env!("TASKPULSE_BUILD_GIT_HASH"),
    "\n  built: ",
    env!("TASKPULSE_BUILD_TIMESTAMP")
);

/// One-line version summary logged at startup.
pub fn startup_metadata_line() -> String {
    format!("taskpulse v{VERSION} ({GIT_COMMIT}, built {BUILD_TIMESTAMP})")
}
