//! Configuration Management
//!
//! Handles persistent configuration storage for octoterra. The API key is
//! never stored here.

use anyhow::{Context, Result};
use octoterra::resource::DEFAULT_PAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const SERVER_ENV: &str = "OCTOPUS_CLI_SERVER";
pub const SPACE_ENV: &str = "OCTOPUS_SPACE_ID";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Octopus server URL
    #[serde(default)]
    pub server: Option<String>,
    /// Space to export, e.g. `Spaces-1`
    #[serde(default)]
    pub space_id: Option<String>,
    /// Output directory
    #[serde(default)]
    pub dest: Option<PathBuf>,
    #[serde(default)]
    pub page_size: Option<usize>,
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("octoterra").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        Self::load_from(&path)
    }

    fn load_from(path: &std::path::Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Get effective server (CLI > config > OCTOPUS_CLI_SERVER)
    pub fn effective_server(&self, cli: Option<&str>) -> Option<String> {
        cli.map(str::to_string)
            .or_else(|| self.server.clone())
            .or_else(|| env_value(SERVER_ENV))
    }

    /// Get effective space (CLI > config > OCTOPUS_SPACE_ID); none means the
    /// server's default space
    pub fn effective_space(&self, cli: Option<&str>) -> Option<String> {
        cli.map(str::to_string)
            .or_else(|| self.space_id.clone())
            .or_else(|| env_value(SPACE_ENV))
    }

    /// Get effective output directory (CLI > config > current directory)
    pub fn effective_dest(&self, cli: Option<PathBuf>) -> PathBuf {
        cli.or_else(|| self.dest.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get effective page size (CLI > config > default)
    pub fn effective_page_size(&self, cli: Option<usize>) -> usize {
        cli.or(self.page_size)
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_beats_config() {
        let config = Config {
            server: Some("https://from-config".to_string()),
            space_id: Some("Spaces-2".to_string()),
            dest: Some(PathBuf::from("/tmp/tf")),
            page_size: Some(50),
        };

        assert_eq!(
            config.effective_server(Some("https://from-cli")).as_deref(),
            Some("https://from-cli")
        );
        assert_eq!(config.effective_server(None).as_deref(), Some("https://from-config"));
        assert_eq!(config.effective_space(None).as_deref(), Some("Spaces-2"));
        assert_eq!(config.effective_dest(None), PathBuf::from("/tmp/tf"));
        assert_eq!(config.effective_page_size(Some(10)), 10);
        assert_eq!(config.effective_page_size(None), 50);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.effective_dest(None), PathBuf::from("."));
        assert_eq!(config.effective_page_size(Some(0)), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            server: Some("https://octopus.example.com".to_string()),
            space_id: Some("Spaces-1".to_string()),
            dest: None,
            page_size: None,
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), config);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }
}
