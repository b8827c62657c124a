//! Achievement checking logic
//!
//! Criteria are evaluated through a registry that maps the `kind` tag to a
//! predicate function. Unknown kinds and malformed parameters evaluate to
//! `false` so one bad catalog entry never blocks the rest.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::definitions::{AchievementDefinition, criteria_kind};
use super::events::XpSource;
use super::levels::{GrantOutcome, Ledger, apply_grant_from, log_grant};
use crate::error::Result;
use crate::store::{AchievementUnlock, CatalogStore, FactProvider, FinancialFacts, ProgressionStore};

/// An achievement that was just unlocked
#[derive(Debug, Clone, Serialize)]
pub struct UnlockedAchievement {
    pub achievement: AchievementDefinition,
    pub unlocked_at: i64,
    pub grant: GrantOutcome,
}

/// Everything a predicate may look at
#[derive(Debug, Clone, Default)]
pub struct FactSheet {
    pub financial: FinancialFacts,
    pub ledger: Ledger,
    /// Current count per streak kind
    pub streaks: HashMap<String, u32>,
}

impl FactSheet {
    pub fn streak(&self, kind: &str) -> u32 {
        self.streaks.get(kind).copied().unwrap_or(0)
    }
}

#[derive(Debug, Error)]
pub enum CriteriaError {
    #[error("criteria has no 'kind' tag")]
    MissingKind,

    #[error("invalid parameters for '{kind}': {source}")]
    InvalidParams {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type PredicateFn = fn(&Value, &FactSheet) -> std::result::Result<bool, CriteriaError>;

#[derive(Deserialize)]
struct Threshold<T> {
    value: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreakThreshold {
    streak_kind: String,
    value: u32,
}

fn params<T: DeserializeOwned>(criteria: &Value, kind: &str) -> std::result::Result<T, CriteriaError> {
    serde_json::from_value(criteria.clone()).map_err(|source| CriteriaError::InvalidParams {
        kind: kind.to_string(),
        source,
    })
}

fn threshold<T: DeserializeOwned>(criteria: &Value, kind: &str) -> std::result::Result<T, CriteriaError> {
    params::<Threshold<T>>(criteria, kind).map(|t| t.value)
}

fn min_transaction_count(c: &Value, f: &FactSheet) -> std::result::Result<bool, CriteriaError> {
    Ok(f.financial.transaction_count >= threshold::<u64>(c, "minTransactionCount")?)
}

fn min_goals_created(c: &Value, f: &FactSheet) -> std::result::Result<bool, CriteriaError> {
    Ok(f.financial.goals_created >= threshold::<u64>(c, "minGoalsCreated")?)
}

fn min_goals_completed(c: &Value, f: &FactSheet) -> std::result::Result<bool, CriteriaError> {
    Ok(f.financial.goals_completed >= threshold::<u64>(c, "minGoalsCompleted")?)
}

fn streak_at_least(c: &Value, f: &FactSheet) -> std::result::Result<bool, CriteriaError> {
    let p: StreakThreshold = params(c, "streakAtLeast")?;
    Ok(f.streak(&p.streak_kind) >= p.value)
}

fn min_cumulative_savings(c: &Value, f: &FactSheet) -> std::result::Result<bool, CriteriaError> {
    Ok(f.financial.cumulative_savings >= threshold::<f64>(c, "minCumulativeSavings")?)
}

fn min_bank_connections(c: &Value, f: &FactSheet) -> std::result::Result<bool, CriteriaError> {
    Ok(f.financial.bank_connections >= threshold::<u64>(c, "minBankConnections")?)
}

fn min_sync_count(c: &Value, f: &FactSheet) -> std::result::Result<bool, CriteriaError> {
    Ok(f.financial.sync_count >= threshold::<u64>(c, "minSyncCount")?)
}

fn min_categorized_transactions(c: &Value, f: &FactSheet) -> std::result::Result<bool, CriteriaError> {
    Ok(f.financial.categorized_transactions >= threshold::<u64>(c, "minCategorizedTransactions")?)
}

fn min_level(c: &Value, f: &FactSheet) -> std::result::Result<bool, CriteriaError> {
    Ok(f.ledger.level >= threshold::<u32>(c, "minLevel")?)
}

fn min_total_xp(c: &Value, f: &FactSheet) -> std::result::Result<bool, CriteriaError> {
    Ok(f.ledger.total_xp >= threshold::<u64>(c, "minTotalXp")?)
}

/// Maps criteria kinds to predicates
#[derive(Clone)]
pub struct PredicateRegistry {
    predicates: HashMap<&'static str, PredicateFn>,
}

impl Default for PredicateRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl PredicateRegistry {
    pub fn empty() -> Self {
        Self {
            predicates: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("minTransactionCount", min_transaction_count);
        registry.register("minGoalsCreated", min_goals_created);
        registry.register("minGoalsCompleted", min_goals_completed);
        registry.register("streakAtLeast", streak_at_least);
        registry.register("minCumulativeSavings", min_cumulative_savings);
        registry.register("minBankConnections", min_bank_connections);
        registry.register("minSyncCount", min_sync_count);
        registry.register("minCategorizedTransactions", min_categorized_transactions);
        registry.register("minLevel", min_level);
        registry.register("minTotalXp", min_total_xp);
        registry
    }

    /// Add or replace the predicate for `kind`
    pub fn register(&mut self, kind: &'static str, predicate: PredicateFn) {
        self.predicates.insert(kind, predicate);
    }

    pub fn knows(&self, kind: &str) -> bool {
        self.predicates.contains_key(kind)
    }

    /// Run the predicate for `criteria`, reporting unknown kinds as `Ok(None)`
    pub fn try_evaluate(
        &self,
        criteria: &Value,
        facts: &FactSheet,
    ) -> std::result::Result<Option<bool>, CriteriaError> {
        let kind = criteria_kind(criteria).ok_or(CriteriaError::MissingKind)?;
        match self.predicates.get(kind) {
            Some(predicate) => predicate(criteria, facts).map(Some),
            None => Ok(None),
        }
    }

    /// Fail-safe evaluation: anything but a satisfied, known predicate is `false`
    pub fn evaluate(&self, achievement: &AchievementDefinition, facts: &FactSheet) -> bool {
        match self.try_evaluate(&achievement.criteria, facts) {
            Ok(Some(satisfied)) => satisfied,
            Ok(None) => {
                debug!(
                    achievement = %achievement.slug,
                    kind = criteria_kind(&achievement.criteria).unwrap_or_default(),
                    "Unknown criteria kind, treating as unsatisfied"
                );
                false
            }
            Err(e) => {
                warn!(achievement = %achievement.slug, error = %e, "Malformed criteria, skipping");
                false
            }
        }
    }
}

/// Evaluates the catalog for a user and performs unlocks
#[derive(Clone, Default)]
pub struct AchievementChecker {
    registry: PredicateRegistry,
}

impl AchievementChecker {
    pub fn new(registry: PredicateRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &PredicateRegistry {
        &self.registry
    }

    /// Gather the facts predicates read
    pub fn fact_sheet(
        &self,
        user_id: &str,
        store: &dyn ProgressionStore,
        facts: &dyn FactProvider,
    ) -> Result<FactSheet> {
        let streaks = store
            .load_streaks(user_id)?
            .into_iter()
            .map(|s| (s.kind, s.current_count))
            .collect();
        Ok(FactSheet {
            financial: facts.facts(user_id)?,
            ledger: store.load_ledger(user_id)?,
            streaks,
        })
    }

    /// Unlock every active achievement the user newly qualifies for and
    /// award its XP. Returns only what this call unlocked.
    ///
    /// The storage uniqueness constraint decides races: a definition is
    /// rewarded only by the call whose insert created the unlock row, and
    /// that insert is written atomically with the reward.
    /// Passes repeat while unlocks happen, since rewarded XP can satisfy
    /// level or XP criteria; each definition unlocks at most once, so the
    /// number of passes is bounded by the catalog size.
    pub fn evaluate_and_unlock(
        &self,
        user_id: &str,
        store: &dyn ProgressionStore,
        facts: &dyn FactProvider,
        catalog: &dyn CatalogStore,
    ) -> Result<Vec<UnlockedAchievement>> {
        let definitions = catalog.active_definitions()?;
        let mut sheet = self.fact_sheet(user_id, store, facts)?;
        let mut seen: HashSet<String> = store.unlocked_ids(user_id)?;
        let mut newly_unlocked = Vec::new();

        loop {
            let candidates: Vec<&AchievementDefinition> = definitions
                .iter()
                .filter(|a| !seen.contains(&a.id))
                .filter(|a| self.registry.evaluate(a, &sheet))
                .collect();
            if candidates.is_empty() {
                break;
            }

            for achievement in candidates {
                seen.insert(achievement.id.clone());

                let unlocked_at = Utc::now().timestamp_millis();
                let unlock = AchievementUnlock::new(user_id, &achievement.id, unlocked_at);
                let source = XpSource::Achievement(achievement.slug.clone());
                let reward = i64::try_from(achievement.xp_reward).unwrap_or(i64::MAX);

                // The unlock row and its reward commit together or not at all
                let mut grant = GrantOutcome::unchanged(sheet.ledger.level);
                let written = store.unlock_with_grant(&unlock, &mut |ledger| {
                    grant = apply_grant_from(ledger, reward, &source);
                })?;
                if written.is_none() {
                    debug!(user_id, achievement = %achievement.slug, "Already unlocked elsewhere");
                    continue;
                }
                log_grant(user_id, reward, &source, &grant);

                info!(
                    user_id,
                    achievement = %achievement.slug,
                    xp = achievement.xp_reward,
                    "Achievement unlocked"
                );
                newly_unlocked.push(UnlockedAchievement {
                    achievement: achievement.clone(),
                    unlocked_at,
                    grant,
                });
            }

            sheet.ledger = store.load_ledger(user_id)?;
        }

        Ok(newly_unlocked)
    }
}
