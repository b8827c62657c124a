//! Shared helpers for progression integration tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use tempfile::TempDir;

use finquest::ProgressionManager;
use finquest::progression::{AchievementDefinition, Criterion, Rarity};
use finquest::store::{MemoryStore, SqliteStore};

/// Temp dir plus the path of a database inside it
pub fn temp_db() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("progression.db");
    (dir, path)
}

/// Manager over a fresh SQLite file, throttling disabled
pub fn sqlite_manager(path: &std::path::Path) -> ProgressionManager {
    let store = SqliteStore::open(path).expect("Failed to open store");
    ProgressionManager::from_sqlite(store).with_check_cooldown(std::time::Duration::ZERO)
}

/// In-memory store and manager sharing it, throttling disabled
pub fn memory_manager(catalog: Vec<AchievementDefinition>) -> (Arc<MemoryStore>, ProgressionManager) {
    let store = Arc::new(MemoryStore::with_catalog(catalog));
    let manager = ProgressionManager::new(store.clone(), store.clone(), store.clone())
        .with_check_cooldown(std::time::Duration::ZERO);
    (store, manager)
}

pub fn achievement(slug: &str, xp: u64, criterion: Criterion) -> AchievementDefinition {
    AchievementDefinition::new(slug, slug, "", Rarity::Common, xp, criterion)
}

pub fn day(offset: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(offset)
}
