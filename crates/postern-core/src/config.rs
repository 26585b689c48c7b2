//! Centralized Configuration Management
//!
//! One `PosternConfig` groups everything a session needs at start-up: channel
//! buffer sizes for the actors, message policy, and where and how the state
//! file is kept.

use core::time::Duration;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::lifecycle::MAX_SERIALIZED_MESSAGE;

/// Default retention window for inbound messages
pub const MESSAGE_LIFETIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the channels between the session actors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Front end → session owner
    pub command_buffer_size: usize,
    /// Session owner → front end
    pub app_event_buffer_size: usize,
    /// Network actor → session owner (fetched records)
    pub delivery_buffer_size: usize,
    /// Network actor → session owner (sent confirmations)
    pub sent_buffer_size: usize,
    /// Network actor → session owner (activity log)
    pub activity_buffer_size: usize,
    /// Session owner → persistence actor
    pub save_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,
            app_event_buffer_size: 64,
            delivery_buffer_size: 16,
            sent_buffer_size: 64,
            activity_buffer_size: 64,
            save_buffer_size: 8,
        }
    }
}

impl ChannelConfig {
    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            command_buffer_size: 100,
            app_event_buffer_size: 100,
            delivery_buffer_size: 100,
            sent_buffer_size: 100,
            activity_buffer_size: 100,
            save_buffer_size: 100,
        }
    }
}

// ----------------------------------------------------------------------------
// Message Configuration
// ----------------------------------------------------------------------------

/// Message policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
    /// How long an inbound message is kept after receipt, in seconds
    pub lifetime_secs: u64,
    /// Upper bound on the serialized size of a composed record
    pub max_serialized_size: usize,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            lifetime_secs: MESSAGE_LIFETIME.as_secs(),
            max_serialized_size: MAX_SERIALIZED_MESSAGE,
        }
    }
}

impl MessageConfig {
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_secs)
    }
}

// ----------------------------------------------------------------------------
// Storage Configuration
// ----------------------------------------------------------------------------

/// Argon2 cost parameters for deriving the state-file key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// Memory cost in KiB
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfConfig {
    /// Cheapest parameters argon2 accepts; keeps tests fast
    pub fn testing() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Where and how the session state is kept on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub state_path: PathBuf,
    pub kdf: KdfConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("postern.state"),
            kdf: KdfConfig::default(),
        }
    }
}

// ----------------------------------------------------------------------------
// Top-level Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for a Postern session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PosternConfig {
    pub channels: ChannelConfig,
    pub messages: MessageConfig,
    pub storage: StorageConfig,
}

impl PosternConfig {
    /// Configuration for tests: roomy channels and a cheap KDF
    pub fn testing() -> Self {
        Self {
            channels: ChannelConfig::testing(),
            messages: MessageConfig::default(),
            storage: StorageConfig {
                state_path: PathBuf::from("postern-test.state"),
                kdf: KdfConfig::testing(),
            },
        }
    }

    /// Validate the configuration for consistency and feasibility
    pub fn validate(&self) -> Result<(), String> {
        let channels = &self.channels;
        if channels.command_buffer_size == 0 {
            return Err("Command buffer size cannot be zero".into());
        }
        if channels.app_event_buffer_size == 0 {
            return Err("App event buffer size cannot be zero".into());
        }
        if channels.delivery_buffer_size == 0 {
            return Err("Delivery buffer size cannot be zero".into());
        }
        if channels.sent_buffer_size == 0 {
            return Err("Sent buffer size cannot be zero".into());
        }
        if channels.activity_buffer_size == 0 {
            return Err("Activity buffer size cannot be zero".into());
        }
        if channels.save_buffer_size == 0 {
            return Err("Save buffer size cannot be zero".into());
        }

        if self.messages.lifetime_secs == 0 {
            return Err("Message lifetime cannot be zero".into());
        }
        if self.messages.max_serialized_size == 0
            || self.messages.max_serialized_size > MAX_SERIALIZED_MESSAGE
        {
            return Err(format!(
                "Max serialized message size must be between 1 and {}",
                MAX_SERIALIZED_MESSAGE
            ));
        }

        let kdf = &self.storage.kdf;
        if kdf.iterations == 0 || kdf.parallelism == 0 {
            return Err("KDF iterations and parallelism must be non-zero".into());
        }
        if kdf.memory_kib < 8 * kdf.parallelism {
            return Err("KDF memory must be at least 8 KiB per lane".into());
        }
        if self.storage.state_path.as_os_str().is_empty() {
            return Err("State path cannot be empty".into());
        }

        Ok(())
    }
}
