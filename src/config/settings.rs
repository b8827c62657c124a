//! Settings configuration types

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Progression tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionSettings {
    /// Seconds during which repeated achievement checks for a user are skipped.
    /// 0 disables throttling.
    #[serde(default = "default_achievement_check_cooldown_secs")]
    pub achievement_check_cooldown_secs: u64,

    /// Attempts per optimistic update before giving up with a conflict
    #[serde(default = "default_max_update_retries")]
    pub max_update_retries: u32,

    /// Per-event XP overrides, keyed by domain event name
    #[serde(default)]
    pub event_xp: HashMap<String, u64>,
}

fn default_achievement_check_cooldown_secs() -> u64 {
    60
}

fn default_max_update_retries() -> u32 {
    8
}

impl Default for ProgressionSettings {
    fn default() -> Self {
        Self {
            achievement_check_cooldown_secs: default_achievement_check_cooldown_secs(),
            max_update_retries: default_max_update_retries(),
            event_xp: HashMap::new(),
        }
    }
}

/// Storage location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database file. Defaults to `~/.finquest/progression.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}
