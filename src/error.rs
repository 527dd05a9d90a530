//! Error types for the registrar and its policy files.

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the register/unregister path.
///
/// Every variant is collapsed to `false` by
/// [`ServiceRegistrar::register_service`](crate::ServiceRegistrar::register_service);
/// use [`try_register`](crate::ServiceRegistrar::try_register) to see the cause.
#[derive(Error, Debug)]
pub enum RegistrarError {
    #[error("not a loadable library: {}", path.display())]
    NotALibrary { path: PathBuf },

    #[error("failed to load {}: {source}", path.display())]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("no backend module loaded from {}", path.display())]
    BackendAbsent { path: PathBuf },

    #[error("symbol `{symbol}` not found in {}", path.display())]
    SymbolNotFound { symbol: &'static str, path: PathBuf },

    #[error("`{symbol}` in {} returned {code}", path.display())]
    BackendCallFailed {
        symbol: &'static str,
        path: PathBuf,
        code: i32,
    },

    #[error("service name cannot be passed to a backend: {name:?}")]
    InvalidServiceName { name: String },

    #[error("D-Bus error: {0}")]
    Bus(#[from] zbus::Error),
}

impl RegistrarError {
    /// True when the failure means "this service has no backend" rather than
    /// "the backend is present but broken".
    pub fn is_backendless(&self) -> bool {
        matches!(
            self,
            RegistrarError::NotALibrary { .. } | RegistrarError::BackendAbsent { .. }
        )
    }
}

/// Failures reading or validating a service policy.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("failed to read policy {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("service name is empty")]
    EmptyName,

    #[error("invalid service name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("policy for '{name}' has an empty pluginPath")]
    EmptyPluginPath { name: String },

    #[error("policy for '{name}' has pluginPath '{path}' outside the plugin directory")]
    PluginPathOutsideDir { name: String, path: String },
}
