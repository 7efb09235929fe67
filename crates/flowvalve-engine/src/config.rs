//! Configuration file management.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use flowvalve_types::AccountId;

/// Complete valve configuration for an embedding host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValveConfig {
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Valve settings.
    #[serde(default)]
    pub valve: ValveSettings,
    /// Advanced settings.
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// Valve configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValveSettings {
    /// Hex-encoded admin account allowed to change the pipe registry.
    #[serde(default)]
    pub admin_account: String,
    /// Event bus buffer capacity per subscriber.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log file path. Empty = stderr.
    #[serde(default)]
    pub log_file: String,
}

// Default value functions

fn default_event_buffer() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
        }
    }
}

impl Default for ValveSettings {
    fn default() -> Self {
        Self {
            admin_account: String::new(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: String::new(),
        }
    }
}

impl ValveConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: ValveConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Path of the SQLite ledger inside the data directory.
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir().join("flowvalve.db")
    }

    /// Parse the configured admin account.
    pub fn admin_account(&self) -> anyhow::Result<AccountId> {
        let bytes = hex::decode(&self.valve.admin_account)?;
        bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("admin_account must be 32 hex-encoded bytes"))
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        // Check env var override first
        if let Ok(dir) = std::env::var("FLOWVALVE_DATA_DIR") {
            return PathBuf::from(dir).join("config.toml");
        }
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("FLOWVALVE_DATA_DIR") {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/Flowvalve")
        }
        #[cfg(target_os = "linux")]
        {
            dirs_fallback(".flowvalve")
        }
        #[cfg(target_os = "windows")]
        {
            dirs_fallback("Flowvalve")
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            dirs_fallback(".flowvalve")
        }
    }
}

/// Initialize tracing for an embedding host.
///
/// `RUST_LOG` takes precedence; otherwise the configured level applies
/// to the flowvalve crates.
pub fn init_logging(config: &ValveConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("flowvalve={}", config.advanced.log_level).parse()?),
        )
        .init();
    Ok(())
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/flowvalve"))
}
