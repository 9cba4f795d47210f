//! Configuration management with file persistence

use crate::domain::locking::CoordinatorConfig;
use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lockward configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub coordinator: CoordinatorSettings,
    pub demo: DemoSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    pub auto_register: bool,
    /// 0 disables the deadline
    pub acquire_timeout_ms: u64,
    pub event_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoSettings {
    pub rounds: u32,
    pub hold_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorSettings {
                auto_register: false,
                acquire_timeout_ms: 0,
                event_capacity: 256,
            },
            demo: DemoSettings {
                rounds: 3,
                hold_ms: 100,
            },
        }
    }
}

impl CoordinatorSettings {
    /// Build the runtime coordinator configuration
    pub fn to_coordinator_config(&self) -> CoordinatorConfig {
        let config = CoordinatorConfig::default()
            .with_auto_register(self.auto_register)
            .with_event_capacity(self.event_capacity);

        if self.acquire_timeout_ms > 0 {
            config.with_timeout(Duration::from_millis(self.acquire_timeout_ms))
        } else {
            config
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("LOCKWARD_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("lockward")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or return defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            // Return default config without creating file
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file, creating parent directories
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.coordinator.event_capacity == 0 {
            return Err(anyhow!("coordinator.event_capacity must be at least 1"));
        }
        if self.demo.rounds == 0 {
            return Err(anyhow!("demo.rounds must be at least 1"));
        }
        Ok(())
    }

    /// Runtime configuration for a coordinator built from these settings
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        self.coordinator.to_coordinator_config()
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            // Coordinator settings
            "coordinator.auto_register" => Ok(self.coordinator.auto_register.to_string()),
            "coordinator.acquire_timeout_ms" => Ok(self.coordinator.acquire_timeout_ms.to_string()),
            "coordinator.event_capacity" => Ok(self.coordinator.event_capacity.to_string()),

            // Demo settings
            "demo.rounds" => Ok(self.demo.rounds.to_string()),
            "demo.hold_ms" => Ok(self.demo.hold_ms.to_string()),

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `lockward config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            // Coordinator settings
            "coordinator.auto_register" => {
                self.coordinator.auto_register = value
                    .parse()
                    .with_context(|| format!("Invalid auto_register value: {}", value))?;
            }
            "coordinator.acquire_timeout_ms" => {
                self.coordinator.acquire_timeout_ms = value
                    .parse()
                    .with_context(|| format!("Invalid acquire_timeout_ms value: {}", value))?;
            }
            "coordinator.event_capacity" => {
                let capacity: usize = value
                    .parse()
                    .with_context(|| format!("Invalid event_capacity value: {}", value))?;
                if capacity == 0 {
                    return Err(anyhow!("Event capacity must be at least 1"));
                }
                self.coordinator.event_capacity = capacity;
            }

            // Demo settings
            "demo.rounds" => {
                let rounds: u32 = value
                    .parse()
                    .with_context(|| format!("Invalid rounds value: {}", value))?;
                if rounds == 0 {
                    return Err(anyhow!("Rounds must be at least 1"));
                }
                self.demo.rounds = rounds;
            }
            "demo.hold_ms" => {
                self.demo.hold_ms = value
                    .parse()
                    .with_context(|| format!("Invalid hold_ms value: {}", value))?;
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `lockward config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = vec![
            "coordinator.auto_register",
            "coordinator.acquire_timeout_ms",
            "coordinator.event_capacity",
            "demo.rounds",
            "demo.hold_ms",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}
