use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::process::{ExecutableLocator, KillSignal, LookupCommandLocator, PathLocator};

/// Which locator backs the installed check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorKind {
    /// Native PATH search
    #[default]
    Path,
    /// Spawn the lookup utility
    Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Signal sent to the process group by `kill`
    pub kill_signal: KillSignal,
    pub locator: LocatorKind,
    /// Utility run by the command locator
    pub lookup_utility: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            kill_signal: KillSignal::Kill,
            locator: LocatorKind::Path,
            lookup_utility: "which".to_string(),
        }
    }
}

impl Settings {
    /// Load from the first config file found, falling back to defaults.
    pub fn load() -> Self {
        for path in Self::search_paths() {
            if path.exists() {
                match Self::load_from(&path) {
                    Ok(settings) => return settings,
                    Err(err) => tracing::warn!(error = %err, "Ignoring config file"),
                }
            }
        }

        Settings::default()
    }

    /// Candidate config files in lookup order
    pub fn search_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("procctl/config.toml")),
            dirs::home_dir().map(|p| p.join(".procctl.toml")),
            Some(PathBuf::from("procctl.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })
    }

    /// Build the configured locator
    pub fn locator(&self) -> Box<dyn ExecutableLocator> {
        match self.locator {
            LocatorKind::Path => Box::new(PathLocator),
            LocatorKind::Command => Box::new(LookupCommandLocator::new(&self.lookup_utility)),
        }
    }
}
