use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A named expense API server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Context {
    pub server_url: String,
}

impl Context {
    pub fn new(server_url: String) -> Self {
        Self { server_url }
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    pub current_context: Option<String>,
    #[serde(default)]
    pub contexts: BTreeMap<String, Context>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("EXPENSECTL_CONFIG") {
            return Ok(PathBuf::from(path));
        }
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".expensectl").join("config.yaml"))
    }

    pub fn get_current_context(&self) -> Option<(&String, &Context)> {
        self.current_context
            .as_ref()
            .and_then(|name| self.contexts.get(name).map(|ctx| (name, ctx)))
    }

    /// Server URL of the named context, or of the current one.
    pub fn server_url(&self, context: Option<&str>) -> Result<Option<String>> {
        match context {
            Some(name) => self
                .contexts
                .get(name)
                .map(|ctx| Some(ctx.server_url.clone()))
                .with_context(|| format!("Context '{}' not found", name)),
            None => Ok(self.get_current_context().map(|(_, ctx)| ctx.server_url.clone())),
        }
    }
}
