//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the shell origin the offline worker fetches assets from
//! and optional overrides for the data and cache directories.
//!
//! Configuration is stored at `~/.config/matchday/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/data/cache directory paths
const APP_NAME: &str = "matchday";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Origin used when neither the config file nor `MATCHDAY_ORIGIN` sets one.
const DEFAULT_ORIGIN: &str = "http://localhost:8000";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub origin: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Origin the application shell is served from. Environment wins over
    /// the config file so a dev server is easy to point at.
    pub fn origin(&self) -> String {
        std::env::var("MATCHDAY_ORIGIN")
            .ok()
            .or_else(|| self.origin.clone())
            .unwrap_or_else(|| DEFAULT_ORIGIN.to_string())
    }

    /// Directory holding the key-value store (match list, credential record).
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Directory holding offline cache generations.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

// ============================================================================
// Tests
// ============================================================================
