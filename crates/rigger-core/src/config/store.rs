//! Config store for locating and loading rigger.toml.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{RiggerConfig, parser};

pub const CONFIG_FILE_NAME: &str = "rigger.toml";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Locate the config file: `./rigger.toml`, then the user config dir.
    pub fn discover() -> anyhow::Result<Self> {
        let project_root = std::env::current_dir()?;
        let global_dir = dirs::config_dir().map(|p| p.join("rigger"));
        Ok(Self::from_paths(&project_root, global_dir.as_deref()))
    }

    /// Pick the project file when present, otherwise the global one.
    pub fn from_paths(project_root: &Path, global_dir: Option<&Path>) -> Self {
        let project = project_root.join(CONFIG_FILE_NAME);
        if project.exists() {
            return Self::from_path(project);
        }
        match global_dir {
            Some(dir) if dir.join(CONFIG_FILE_NAME).exists() => {
                Self::from_path(dir.join(CONFIG_FILE_NAME))
            }
            _ => Self::from_path(project),
        }
    }

    pub fn from_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn load(&self) -> anyhow::Result<RiggerConfig> {
        if !self.config_path.exists() {
            anyhow::bail!(
                "No {} found at {}",
                CONFIG_FILE_NAME,
                self.config_path.display()
            );
        }
        parser::parse_rigger_toml(&self.config_path)
    }

    pub fn save(&self, config: &RiggerConfig) -> anyhow::Result<()> {
        let content = parser::to_toml(config).context("Failed to serialize config to TOML")?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.config_path, content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;
        Ok(())
    }
}
