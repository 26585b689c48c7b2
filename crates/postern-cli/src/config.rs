//! Postern CLI Configuration
//!
//! The CLI reads an optional TOML file holding the session configuration
//! plus a few front-end settings. Missing sections fall back to defaults, so
//! an empty file is valid:
//!
//! ```toml
//! [session.storage]
//! state_path = "alice.state"
//!
//! [cli]
//! event_timeout_secs = 10
//! ```

use std::path::Path;
use std::time::Duration;

use postern_core::PosternConfig;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the Postern CLI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Session configuration handed to the runtime
    pub session: PosternConfig,
    pub cli: CliConfig,
}

/// Front-end settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// How long to wait for the session to answer a request
    pub event_timeout_secs: u64,
    /// Print network activity lines while waiting
    pub show_activity: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            event_timeout_secs: 10,
            show_activity: true,
        }
    }
}

impl CliConfig {
    pub fn event_timeout(&self) -> Duration {
        Duration::from_secs(self.event_timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileSystem(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml(&text)
            .map_err(|e| ConfigError::Loading(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(text).map_err(|e| ConfigError::Loading(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.validate().map_err(ConfigError::Validation)?;
        if self.cli.event_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Event timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Create example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&AppConfig::default())
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    FileSystem(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
