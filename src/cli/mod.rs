//! CLI command implementations

pub mod achievements;
pub mod event;
pub mod facts;
pub mod init;
pub mod streak;
pub mod xp;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::Serialize;

use finquest::ProgressionManager;
use finquest::config::Config;
use finquest::store::SqliteStore;

/// Resolved settings shared by all commands
pub struct Context {
    pub config: Config,
    pub db_path: PathBuf,
    pub user: String,
    pub json: bool,
}

impl Context {
    pub fn load(config_path: Option<&Path>, db: Option<PathBuf>, user: String, json: bool) -> Result<Self> {
        let config = Config::load(config_path)?;
        let db_path = db.unwrap_or_else(|| config.database_path());
        Ok(Self {
            config,
            db_path,
            user,
            json,
        })
    }

    pub fn store(&self) -> Result<SqliteStore> {
        let store = SqliteStore::open(&self.db_path)
            .with_context(|| format!("Failed to open database: {}", self.db_path.display()))?;
        Ok(store.with_max_retries(self.config.progression.max_update_retries))
    }

    pub fn manager(&self) -> Result<ProgressionManager> {
        Ok(ProgressionManager::from_sqlite(self.store()?).with_settings(&self.config.progression))
    }

    /// Print `value` as JSON when `--json` is set, otherwise run `text`
    pub fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text(value);
        }
        Ok(())
    }
}
