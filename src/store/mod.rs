//! Storage boundary for the progression core
//!
//! The engine never locks anything itself. Every mutation goes through
//! [`ProgressionStore`], whose implementations guarantee that the closure
//! passed to an `update_*` call is applied atomically per key (re-running it
//! on conflict), and that unlock rows are unique per (user, achievement).

mod db;
mod memory;

pub use db::SqliteStore;
pub use memory::MemoryStore;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::progression::{AchievementDefinition, Ledger, Streak};

/// Durable record that an achievement was granted to a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementUnlock {
    pub id: String,
    pub user_id: String,
    pub achievement_id: String,
    /// Milliseconds since the Unix epoch
    pub unlocked_at: i64,
}

impl AchievementUnlock {
    pub fn new(user_id: &str, achievement_id: &str, unlocked_at: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            achievement_id: achievement_id.to_string(),
            unlocked_at,
        }
    }
}

/// Aggregate facts about a user's finances, computed outside this crate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancialFacts {
    pub transaction_count: u64,
    pub goals_created: u64,
    pub goals_completed: u64,
    pub cumulative_savings: f64,
    pub bank_connections: u64,
    pub sync_count: u64,
    pub categorized_transactions: u64,
}

/// Persistence for ledgers, streaks and unlocks
pub trait ProgressionStore: Send + Sync {
    /// Current ledger, or the default one if the user has none yet (not persisted)
    fn load_ledger(&self, user_id: &str) -> Result<Ledger>;

    /// Atomically apply `apply` to the user's ledger, creating it if absent.
    ///
    /// `apply` may run more than once when a concurrent writer wins; only
    /// the final run is persisted. Returns the persisted value.
    fn update_ledger(&self, user_id: &str, apply: &mut dyn FnMut(&mut Ledger)) -> Result<Ledger>;

    fn load_streak(&self, user_id: &str, kind: &str) -> Result<Option<Streak>>;

    fn load_streaks(&self, user_id: &str) -> Result<Vec<Streak>>;

    /// Same contract as [`ProgressionStore::update_ledger`], per (user, kind)
    fn update_streak(
        &self,
        user_id: &str,
        kind: &str,
        apply: &mut dyn FnMut(&mut Streak),
    ) -> Result<Streak>;

    /// Insert an unlock row and apply `apply` to the user's ledger as one
    /// atomic write.
    ///
    /// Uniqueness on `(user_id, achievement_id)` is enforced by storage:
    /// returns `None` without touching the ledger when the row already
    /// exists. On error neither the unlock nor the ledger change persists.
    fn unlock_with_grant(
        &self,
        unlock: &AchievementUnlock,
        apply: &mut dyn FnMut(&mut Ledger),
    ) -> Result<Option<Ledger>>;

    /// Apply `apply` to a streak and the owning user's ledger as one atomic
    /// write, creating either if absent. Same re-run contract as
    /// [`ProgressionStore::update_ledger`].
    fn update_streak_with_ledger(
        &self,
        user_id: &str,
        kind: &str,
        apply: &mut dyn FnMut(&mut Streak, &mut Ledger),
    ) -> Result<(Streak, Ledger)>;

    fn unlocked_ids(&self, user_id: &str) -> Result<HashSet<String>>;

    fn unlocks(&self, user_id: &str) -> Result<Vec<AchievementUnlock>>;
}

/// Source of aggregate user facts for achievement predicates
pub trait FactProvider: Send + Sync {
    fn facts(&self, user_id: &str) -> Result<FinancialFacts>;
}

/// Source of achievement definitions
pub trait CatalogStore: Send + Sync {
    /// Active definitions only. Load failures must be reported as
    /// `CatalogUnavailable`, never as an empty list.
    fn active_definitions(&self) -> Result<Vec<AchievementDefinition>>;
}
