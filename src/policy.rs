//! Service policy files.
//!
//! A policy names one hosted service, the bus it lives on and the backend
//! library that implements it:
//!
//! ```json
//! {
//!   "name": "com.example.Foo",
//!   "bus": "session",
//!   "pluginPath": "libfoo.so"
//! }
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use zbus::names::WellKnownName;

use crate::error::PolicyError;

/// Which message bus a service is exposed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BusType {
    System,
    #[default]
    Session,
}

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusType::System => write!(f, "system"),
            BusType::Session => write!(f, "session"),
        }
    }
}

/// Configuration for one hosted service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServicePolicy {
    /// Well-known bus name the service is registered under
    pub name: String,
    /// Bus the service is exposed on
    #[serde(default)]
    pub bus: BusType,
    /// Private bus address or connection name (uses the shared bus connection when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus_override: Option<String>,
    /// Backend library, relative to the plugin directory
    pub plugin_path: String,
}

impl ServicePolicy {
    /// Build a session-bus policy with no override.
    pub fn new(name: impl Into<String>, plugin_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bus: BusType::Session,
            bus_override: None,
            plugin_path: plugin_path.into(),
        }
    }

    /// Read, parse and validate a policy file.
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let content = fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let policy: Self = serde_json::from_str(&content).map_err(|source| PolicyError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        policy.validate()?;
        Ok(policy)
    }

    /// Load every `*.json` policy in a directory, sorted by file name.
    ///
    /// Files that fail to load are skipped and returned in
    /// [`PolicySet::rejected`].
    pub fn load_dir(dir: &Path) -> Result<PolicySet, PolicyError> {
        let entries = fs::read_dir(dir).map_err(|source| PolicyError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut set = PolicySet::default();
        for path in paths {
            match Self::load(&path) {
                Ok(policy) => {
                    debug!(service = %policy.name, path = %path.display(), "Loaded policy");
                    set.policies.push(policy);
                }
                Err(e) => {
                    warn!("Skipping policy {}: {}", path.display(), e);
                    set.rejected.push((path, e));
                }
            }
        }
        Ok(set)
    }

    /// Check the policy invariants.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.name.is_empty() {
            return Err(PolicyError::EmptyName);
        }
        WellKnownName::try_from(self.name.as_str()).map_err(|e| PolicyError::InvalidName {
            name: self.name.clone(),
            reason: e.to_string(),
        })?;
        if self.plugin_path.trim().is_empty() {
            return Err(PolicyError::EmptyPluginPath {
                name: self.name.clone(),
            });
        }
        let escapes = Path::new(&self.plugin_path)
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(PolicyError::PluginPathOutsideDir {
                name: self.name.clone(),
                path: self.plugin_path.clone(),
            });
        }
        Ok(())
    }

    /// The override, treating an empty string as absent.
    pub fn bus_override(&self) -> Option<&str> {
        self.bus_override.as_deref().filter(|s| !s.is_empty())
    }

    /// Location of the backend library: `<plugin_dir>/<plugin_path>`.
    ///
    /// Roots and `..` in `plugin_path` are dropped, so the result is always
    /// under `plugin_dir`.
    pub fn module_path(&self, plugin_dir: &Path) -> PathBuf {
        let mut path = plugin_dir.to_path_buf();
        for component in Path::new(&self.plugin_path).components() {
            if let Component::Normal(part) = component {
                path.push(part);
            }
        }
        path
    }
}

/// Result of loading a policy directory.
#[derive(Debug, Default)]
pub struct PolicySet {
    pub policies: Vec<ServicePolicy>,
    pub rejected: Vec<(PathBuf, PolicyError)>,
}
