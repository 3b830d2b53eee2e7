//! Settings for the persistence engine.
//!
//! The host editor hands these in when opening a project; they are persisted
//! as TOML alongside the editor's own preferences. Timing knobs are stored
//! as milliseconds so the settings file stays plain numbers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Where autosave sends project changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutosaveMode {
    /// No automatic persistence; saves are explicit only.
    Off,
    /// Debounced saves to the remote store, local cache as a failure
    /// safety net.
    #[default]
    Cloud,
    /// Debounced mirroring into the local cache only (e.g., signed-out
    /// editing).
    LocalCache,
}

/// Tunable behavior for the sync coordinators and history manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Autosave destination.
    #[serde(default)]
    pub autosave: AutosaveMode,

    /// Quiet period before a burst of edits triggers a cloud save.
    #[serde(default = "default_save_debounce_ms")]
    pub save_debounce_ms: u64,

    /// Delay before retrying a failed cloud save.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Quiet period before a burst of edits is mirrored to the local cache.
    #[serde(default = "default_cache_debounce_ms")]
    pub cache_debounce_ms: u64,

    /// Maximum number of undo steps kept in the history log.
    #[serde(default = "default_max_undo")]
    pub max_undo: usize,
}

fn default_save_debounce_ms() -> u64 {
    1_500
}

fn default_retry_delay_ms() -> u64 {
    8_000
}

fn default_cache_debounce_ms() -> u64 {
    1_000
}

fn default_max_undo() -> usize {
    100
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            autosave: AutosaveMode::default(),
            save_debounce_ms: default_save_debounce_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            cache_debounce_ms: default_cache_debounce_ms(),
            max_undo: default_max_undo(),
        }
    }
}

impl SyncSettings {
    /// Debounce window for cloud saves.
    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    /// Delay before retrying a failed cloud save.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Debounce window for local cache mirroring.
    pub fn cache_debounce(&self) -> Duration {
        Duration::from_millis(self.cache_debounce_ms)
    }

    /// Parse settings from TOML.
    pub fn from_toml(toml: &str) -> Result<Self> {
        Ok(toml::from_str(toml)?)
    }

    /// Serialize settings to TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
