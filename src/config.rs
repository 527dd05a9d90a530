//! Host directories.
//!
//! Each directory comes from the command line, then the environment, then a
//! built-in default.

use std::path::PathBuf;

/// Where backend libraries are installed.
pub const DEFAULT_PLUGIN_DIR: &str = "/usr/lib/dsm/plugins";

/// Where service policies are installed.
pub const DEFAULT_POLICY_DIR: &str = "/usr/share/dsm/services";

pub const PLUGIN_DIR_ENV: &str = "DSM_PLUGIN_DIR";
pub const POLICY_DIR_ENV: &str = "DSM_POLICY_DIR";

pub fn plugin_dir(explicit: Option<PathBuf>) -> PathBuf {
    resolve_dir(
        explicit,
        std::env::var(PLUGIN_DIR_ENV).ok(),
        DEFAULT_PLUGIN_DIR,
    )
}

pub fn policy_dir(explicit: Option<PathBuf>) -> PathBuf {
    resolve_dir(
        explicit,
        std::env::var(POLICY_DIR_ENV).ok(),
        DEFAULT_POLICY_DIR,
    )
}

fn resolve_dir(explicit: Option<PathBuf>, env: Option<String>, default: &str) -> PathBuf {
    explicit
        .or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(default))
}
