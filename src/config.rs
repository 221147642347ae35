//! Configuration management
//!
//! Loads configuration from config.toml with support for:
//! - Server binding settings
//! - Optional SQLite persistence
//! - Ledger validation limits

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file. `None` keeps the ledger in memory only.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Validation limits applied before any ledger mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Smallest reward accepted for a new issue
    pub min_reward: u64,
    /// Longest accepted text field, in bytes
    pub max_text_len: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            min_reward: 1,
            max_text_len: 4096,
        }
    }
}

impl Config {
    /// Load from config.toml or use defaults
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    /// Load from specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            // Use embedded default config
            toml::from_str(DEFAULT_CONFIG).context("Failed to parse default config")
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|_| Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            storage: StorageConfig::default(),
            ledger: LedgerConfig::default(),
        })
    }
}
