//! Typed configuration accepted by the embedding application (spec §6:
//! "the core must accept configuration as a typed struct, not parse CLI
//! flags"). No argument parsing lives in this crate.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::discovery::DiscoveryConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_tick_interval_seconds")]
    pub scheduler_tick_interval_seconds: u64,

    #[serde(default = "default_stale_threshold_seconds")]
    pub stale_execution_threshold_seconds: i64,

    #[serde(default = "default_chord_timeout_seconds")]
    pub chord_timeout_seconds: u64,

    #[serde(default = "default_chord_poll_seconds")]
    pub chord_poll_interval_seconds: u64,

    #[serde(default)]
    pub error_handling: ErrorHandlingMode,

    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandlingMode {
    #[default]
    Continue,
    Abort,
}

fn default_tick_interval_seconds() -> u64 {
    30
}
fn default_stale_threshold_seconds() -> i64 {
    600
}
fn default_chord_timeout_seconds() -> u64 {
    600
}
fn default_chord_poll_seconds() -> u64 {
    2
}

impl CoreConfig {
    pub fn scheduler_tick_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_tick_interval_seconds)
    }

    pub fn stale_execution_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_execution_threshold_seconds)
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            scheduler_tick_interval_seconds: default_tick_interval_seconds(),
            stale_execution_threshold_seconds: default_stale_threshold_seconds(),
            chord_timeout_seconds: default_chord_timeout_seconds(),
            chord_poll_interval_seconds: default_chord_poll_seconds(),
            error_handling: ErrorHandlingMode::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let config = CoreConfig::default();
        assert_eq!(config.scheduler_tick_interval(), Duration::from_secs(30));
        assert_eq!(config.stale_execution_threshold(), chrono::Duration::seconds(600));
        assert_eq!(config.error_handling, ErrorHandlingMode::Continue);
    }

    #[test]
    fn deserializes_from_json_with_defaults() {
        let config: CoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.scheduler_tick_interval_seconds, 30);
    }
}
