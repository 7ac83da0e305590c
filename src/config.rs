//! Configuration
//!
//! Stored in `~/.config/metabind/config.toml`:
//!
//! ```toml
//! [vault]
//! root = "/home/me/notes"
//!
//! [sync]
//! interval_ms = 200
//! evict_after_cycles = 5
//! ```
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Command-line flags
//! 2. Environment variables (`METABIND_VAULT`, `METABIND_SYNC_INTERVAL_MS`)
//! 3. Config file
//! 4. Defaults

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{SyncSettings, DEFAULT_EVICT_AFTER_CYCLES};
use crate::error::{MetaBindError, Result};

pub const ENV_VAULT: &str = "METABIND_VAULT";
pub const ENV_SYNC_INTERVAL_MS: &str = "METABIND_SYNC_INTERVAL_MS";

const DEFAULT_SYNC_INTERVAL_MS: u64 = 200;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetaBindConfig {
    #[serde(default)]
    pub vault: VaultSection,

    #[serde(default)]
    pub sync: SyncSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VaultSection {
    /// Directory holding the notes
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncSection {
    /// Delay between coalesced flushes
    pub interval_ms: u64,
    /// Idle sync cycles before an unused cache is dropped
    pub evict_after_cycles: u32,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_SYNC_INTERVAL_MS,
            evict_after_cycles: DEFAULT_EVICT_AFTER_CYCLES,
        }
    }
}

impl MetaBindConfig {
    /// `~/.config/metabind/` on Unix, `%APPDATA%/metabind/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("metabind")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load from the default location; a missing file means defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| MetaBindError::Config {
            reason: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        toml::from_str(&content).map_err(|e| MetaBindError::Config {
            reason: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }

    /// Environment variables override file values
    pub fn with_env(self) -> Result<Self> {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    fn with_env_from(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(root) = var(ENV_VAULT).filter(|v| !v.is_empty()) {
            self.vault.root = Some(PathBuf::from(root));
        }

        if let Some(interval) = var(ENV_SYNC_INTERVAL_MS).filter(|v| !v.is_empty()) {
            self.sync.interval_ms = interval.trim().parse().map_err(|_| MetaBindError::Config {
                reason: format!("{ENV_SYNC_INTERVAL_MS}='{interval}' is not a number of milliseconds"),
            })?;
        }

        Ok(self)
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            evict_after_cycles: self.sync.evict_after_cycles,
        }
    }

    pub fn sync_interval(&self) -> Duration {
        // A zero interval would make tokio's interval panic
        Duration::from_millis(self.sync.interval_ms.max(1))
    }

    /// Vault root, or a config error telling the user how to set one
    pub fn vault_root(&self) -> Result<&Path> {
        self.vault.root.as_deref().ok_or_else(|| MetaBindError::Config {
            reason: format!("no vault configured (use --vault, {ENV_VAULT}, or [vault] root in config.toml)"),
        })
    }
}
