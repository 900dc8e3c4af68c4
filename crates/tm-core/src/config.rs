use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const CONFIG_FILE: &str = "config.toml";

fn default_base_image() -> String {
    "eu.gcr.io/gardener-project/gardener/testmachinery/base-step:latest".to_string()
}

fn default_prepare_image() -> String {
    "eu.gcr.io/gardener-project/gardener/testmachinery/prepare-step:latest".to_string()
}

fn default_active_deadline_seconds() -> u64 {
    600
}

/// Settings the flow compiler needs from its environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Image for test definitions that do not specify one.
    #[serde(default = "default_base_image")]
    pub base_image: String,
    #[serde(default = "default_prepare_image")]
    pub prepare_image: String,
    #[serde(default = "default_active_deadline_seconds")]
    pub default_active_deadline_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_image: default_base_image(),
            prepare_image: default_prepare_image(),
            default_active_deadline_seconds: default_active_deadline_seconds(),
        }
    }
}

impl Settings {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::PathIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.base_image.trim().is_empty() {
            return Err(ConfigError::General("base_image must not be empty".into()));
        }
        if self.prepare_image.trim().is_empty() {
            return Err(ConfigError::General(
                "prepare_image must not be empty".into(),
            ));
        }
        if self.default_active_deadline_seconds == 0 {
            return Err(ConfigError::General(
                "default_active_deadline_seconds must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Loads `$XDG_CONFIG_HOME/tm/config.toml`, falling back to defaults when absent.
pub fn load_settings() -> Result<Settings, ConfigError> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("tm");
    match xdg_dirs.find_config_file(CONFIG_FILE) {
        Some(path) => {
            tracing::debug!("Loading settings from '{}'", path.display());
            Settings::from_path(&path)
        }
        None => {
            tracing::debug!("No settings file found, using defaults.");
            Ok(Settings::default())
        }
    }
}
