//! Engine configuration with documented constants
//!
//! Timing and retry knobs for the polling loops. Everything here is
//! about pacing the interaction with the device; battle content comes
//! from the script store.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::core::error::{CopilotError, Result};

/// Configuration for the battle execution engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === POLLING ===
    /// Sleep between two iterations of any busy-poll loop (milliseconds)
    ///
    /// Bounds CPU use while waiting on a condition. Every iteration still
    /// runs the idle hook, so this is a scheduler tick, not a timeout.
    pub poll_interval_ms: u64,

    /// Consecutive unknown-screen polls tolerated by the weak in-battle check
    ///
    /// Scene transitions produce a few frames that are neither the battle
    /// screen nor anything else recognizable.
    pub weak_grace_polls: u32,

    // === UI RETRIES ===
    /// Polls spent looking for the skill button after selecting a unit
    pub skill_button_retries: u32,

    /// Attempts for a single template click (start, draw, settle, ...)
    pub ui_retries: u32,

    // === GESTURES ===
    /// Duration of the drag from the roster panel onto a tile
    pub deploy_swipe_ms: u64,

    /// Length of the facing swipe after dropping a unit (pixels)
    pub facing_swipe_px: i32,

    /// Duration of the facing swipe
    pub facing_swipe_ms: u64,

    /// Duration of a camera pan
    pub camera_swipe_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            weak_grace_polls: 5,

            skill_button_retries: 20,
            ui_retries: 10,

            deploy_swipe_ms: 300,
            facing_swipe_px: 200,
            facing_swipe_ms: 150,
            camera_swipe_ms: 500,
        }
    }
}

impl EngineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_poll_interval_ms(mut self, millis: u64) -> Self {
        self.poll_interval_ms = millis;
        self
    }

    pub fn with_ui_retries(mut self, retries: u32) -> Self {
        self.ui_retries = retries;
        self
    }

    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.ui_retries == 0 {
            return Err(CopilotError::InvalidConfig(
                "ui_retries must be at least 1".into(),
            ));
        }
        if self.skill_button_retries == 0 {
            return Err(CopilotError::InvalidConfig(
                "skill_button_retries must be at least 1".into(),
            ));
        }
        if self.facing_swipe_px <= 0 {
            return Err(CopilotError::InvalidConfig(format!(
                "facing_swipe_px ({}) must be positive",
                self.facing_swipe_px
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("poll_interval_ms = 0\nweak_grace_polls = 2\n")
            .unwrap();
        assert_eq!(config.poll_interval_ms, 0);
        assert_eq!(config.weak_grace_polls, 2);
        assert_eq!(config.ui_retries, EngineConfig::default().ui_retries);
    }

    #[test]
    fn test_zero_retries_rejected() {
        let result = EngineConfig::from_toml_str("ui_retries = 0");
        assert!(matches!(result, Err(CopilotError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        fs::write(&path, "facing_swipe_px = 120\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.facing_swipe_px, 120);
    }
}
