//! In-memory store
//!
//! One mutex per entity kind; updates hold the lock across the closure, so
//! per-key serialization is pessimistic. Combined writes take locks in the
//! order ledgers, streaks, unlocks and commit only after every step passed.
//! Used by tests and embedders that keep progression state in process.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{AchievementUnlock, CatalogStore, FactProvider, FinancialFacts, ProgressionStore};
use crate::error::{ProgressionError, Result};
use crate::progression::{AchievementDefinition, Ledger, Streak};

#[derive(Default)]
pub struct MemoryStore {
    ledgers: Mutex<HashMap<String, Ledger>>,
    streaks: Mutex<HashMap<(String, String), Streak>>,
    unlocks: Mutex<Vec<AchievementUnlock>>,
    facts: Mutex<HashMap<String, FinancialFacts>>,
    catalog: Mutex<Vec<AchievementDefinition>>,
    catalog_down: AtomicBool,
    ledger_failures: AtomicU32,
}

fn guard<'a, T>(m: &'a Mutex<T>, name: &'static str) -> Result<MutexGuard<'a, T>> {
    m.lock().map_err(|_| ProgressionError::LockPoisoned(name))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with a catalog
    pub fn with_catalog(definitions: Vec<AchievementDefinition>) -> Self {
        let store = Self::default();
        if let Ok(mut catalog) = store.catalog.lock() {
            *catalog = definitions;
        }
        store
    }

    pub fn set_catalog(&self, definitions: Vec<AchievementDefinition>) -> Result<()> {
        *guard(&self.catalog, "catalog")? = definitions;
        Ok(())
    }

    /// Make catalog loads fail until called again with `false`
    pub fn fail_catalog(&self, down: bool) {
        self.catalog_down.store(down, Ordering::SeqCst);
    }

    /// Make the next `times` ledger writes fail with a conflict
    pub fn fail_ledger_writes(&self, times: u32) {
        self.ledger_failures.store(times, Ordering::SeqCst);
    }

    fn check_ledger_write(&self, user_id: &str) -> Result<()> {
        let injected = self
            .ledger_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(ProgressionError::Conflict {
                key: format!("ledger:{user_id}"),
                attempts: 1,
            });
        }
        Ok(())
    }

    pub fn set_facts(&self, user_id: &str, facts: FinancialFacts) -> Result<()> {
        guard(&self.facts, "facts")?.insert(user_id.to_string(), facts);
        Ok(())
    }

    /// Mutate a user's facts in place
    pub fn update_facts(&self, user_id: &str, apply: impl FnOnce(&mut FinancialFacts)) -> Result<()> {
        let mut facts = guard(&self.facts, "facts")?;
        apply(facts.entry(user_id.to_string()).or_default());
        Ok(())
    }
}

impl ProgressionStore for MemoryStore {
    fn load_ledger(&self, user_id: &str) -> Result<Ledger> {
        let ledgers = guard(&self.ledgers, "ledgers")?;
        Ok(ledgers.get(user_id).cloned().unwrap_or_default())
    }

    fn update_ledger(&self, user_id: &str, apply: &mut dyn FnMut(&mut Ledger)) -> Result<Ledger> {
        let mut ledgers = guard(&self.ledgers, "ledgers")?;
        let ledger = ledgers.entry(user_id.to_string()).or_default();
        let mut next = ledger.clone();
        apply(&mut next);
        self.check_ledger_write(user_id)?;
        *ledger = next.clone();
        Ok(next)
    }

    fn load_streak(&self, user_id: &str, kind: &str) -> Result<Option<Streak>> {
        let streaks = guard(&self.streaks, "streaks")?;
        Ok(streaks
            .get(&(user_id.to_string(), kind.to_string()))
            .cloned())
    }

    fn load_streaks(&self, user_id: &str) -> Result<Vec<Streak>> {
        let streaks = guard(&self.streaks, "streaks")?;
        let mut list: Vec<Streak> = streaks
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.kind.cmp(&b.kind));
        Ok(list)
    }

    fn update_streak(
        &self,
        user_id: &str,
        kind: &str,
        apply: &mut dyn FnMut(&mut Streak),
    ) -> Result<Streak> {
        let mut streaks = guard(&self.streaks, "streaks")?;
        let streak = streaks
            .entry((user_id.to_string(), kind.to_string()))
            .or_insert_with(|| Streak::new(user_id, kind));
        let mut next = streak.clone();
        apply(&mut next);
        *streak = next.clone();
        Ok(next)
    }

    fn unlock_with_grant(
        &self,
        unlock: &AchievementUnlock,
        apply: &mut dyn FnMut(&mut Ledger),
    ) -> Result<Option<Ledger>> {
        let mut ledgers = guard(&self.ledgers, "ledgers")?;
        let mut unlocks = guard(&self.unlocks, "unlocks")?;
        let exists = unlocks
            .iter()
            .any(|u| u.user_id == unlock.user_id && u.achievement_id == unlock.achievement_id);
        if exists {
            return Ok(None);
        }

        let mut next = ledgers.get(&unlock.user_id).cloned().unwrap_or_default();
        apply(&mut next);
        self.check_ledger_write(&unlock.user_id)?;

        ledgers.insert(unlock.user_id.clone(), next.clone());
        unlocks.push(unlock.clone());
        Ok(Some(next))
    }

    fn update_streak_with_ledger(
        &self,
        user_id: &str,
        kind: &str,
        apply: &mut dyn FnMut(&mut Streak, &mut Ledger),
    ) -> Result<(Streak, Ledger)> {
        let mut ledgers = guard(&self.ledgers, "ledgers")?;
        let mut streaks = guard(&self.streaks, "streaks")?;
        let key = (user_id.to_string(), kind.to_string());

        let mut streak = streaks
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Streak::new(user_id, kind));
        let mut ledger = ledgers.get(user_id).cloned().unwrap_or_default();
        apply(&mut streak, &mut ledger);
        self.check_ledger_write(user_id)?;

        streaks.insert(key, streak.clone());
        ledgers.insert(user_id.to_string(), ledger.clone());
        Ok((streak, ledger))
    }

    fn unlocked_ids(&self, user_id: &str) -> Result<HashSet<String>> {
        let unlocks = guard(&self.unlocks, "unlocks")?;
        Ok(unlocks
            .iter()
            .filter(|u| u.user_id == user_id)
            .map(|u| u.achievement_id.clone())
            .collect())
    }

    fn unlocks(&self, user_id: &str) -> Result<Vec<AchievementUnlock>> {
        let unlocks = guard(&self.unlocks, "unlocks")?;
        Ok(unlocks.iter().filter(|u| u.user_id == user_id).cloned().collect())
    }
}

impl FactProvider for MemoryStore {
    fn facts(&self, user_id: &str) -> Result<FinancialFacts> {
        let facts = guard(&self.facts, "facts")?;
        Ok(facts.get(user_id).cloned().unwrap_or_default())
    }
}

impl CatalogStore for MemoryStore {
    fn active_definitions(&self) -> Result<Vec<AchievementDefinition>> {
        if self.catalog_down.load(Ordering::SeqCst) {
            return Err(ProgressionError::CatalogUnavailable(
                "in-memory catalog marked unavailable".to_string(),
            ));
        }
        let catalog = guard(&self.catalog, "catalog")?;
        Ok(catalog.iter().filter(|a| a.active).cloned().collect())
    }
}
