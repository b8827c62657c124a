//! Progression manager - the operations callers invoke
//!
//! Sequences ledger grants, streak advances and achievement checks.
//! All state lives behind the injected store; this type holds no locks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::checker::{AchievementChecker, PredicateRegistry, UnlockedAchievement};
use super::events::{GamificationEvent, XpSource, domain_event};
use super::levels::{
    DeductOutcome, GrantOutcome, ProgressionSnapshot, apply_grant_from, deduct_experience,
    grant_experience, log_grant, title_for_level,
};
use super::streaks::{Streak, StreakOutcome, today};
use super::throttle::{InMemoryTtlCache, TtlCache};
use crate::config::ProgressionSettings;
use crate::error::{ProgressionError, Result};
use crate::store::{AchievementUnlock, CatalogStore, FactProvider, ProgressionStore, SqliteStore};

/// Default achievement-check cool-down per user
pub const DEFAULT_CHECK_COOLDOWN: Duration = Duration::from_secs(60);

/// Grant result plus whatever the follow-up check unlocked
#[derive(Debug, Clone, Serialize)]
pub struct GrantResult {
    pub outcome: GrantOutcome,
    pub unlocked: Vec<UnlockedAchievement>,
}

/// Streak advance result, with the bonus grant if one was paid
#[derive(Debug, Clone, Serialize)]
pub struct StreakResult {
    pub outcome: StreakOutcome,
    pub bonus: Option<GrantOutcome>,
    pub unlocked: Vec<UnlockedAchievement>,
}

/// Main entry point for all gamification features
pub struct ProgressionManager {
    store: Arc<dyn ProgressionStore>,
    facts: Arc<dyn FactProvider>,
    catalog: Arc<dyn CatalogStore>,
    throttle: Arc<dyn TtlCache>,
    checker: AchievementChecker,
    check_cooldown: Duration,
    event_xp: HashMap<String, u64>,
}

impl ProgressionManager {
    pub fn new(
        store: Arc<dyn ProgressionStore>,
        facts: Arc<dyn FactProvider>,
        catalog: Arc<dyn CatalogStore>,
    ) -> Self {
        Self {
            store,
            facts,
            catalog,
            throttle: Arc::new(InMemoryTtlCache::new()),
            checker: AchievementChecker::default(),
            check_cooldown: DEFAULT_CHECK_COOLDOWN,
            event_xp: HashMap::new(),
        }
    }

    /// Manager using one SQLite database for state, facts and catalog
    pub fn from_sqlite(store: SqliteStore) -> Self {
        let store = Arc::new(store);
        Self::new(store.clone(), store.clone(), store)
    }

    pub fn with_throttle(mut self, throttle: Arc<dyn TtlCache>) -> Self {
        self.throttle = throttle;
        self
    }

    /// Zero disables throttling
    pub fn with_check_cooldown(mut self, cooldown: Duration) -> Self {
        self.check_cooldown = cooldown;
        self
    }

    pub fn with_registry(mut self, registry: PredicateRegistry) -> Self {
        self.checker = AchievementChecker::new(registry);
        self
    }

    pub fn with_settings(mut self, settings: &ProgressionSettings) -> Self {
        self.check_cooldown = Duration::from_secs(settings.achievement_check_cooldown_secs);
        for (name, xp) in &settings.event_xp {
            if domain_event(name).is_some() {
                self.event_xp.insert(name.clone(), *xp);
            } else {
                warn!(event = %name, "Ignoring XP override for unknown domain event");
            }
        }
        self
    }

    // ========================================
    // XP & LEVEL OPERATIONS
    // ========================================

    /// Award XP, then re-check achievements.
    ///
    /// `XpSource::LevelBonus` is always rejected and non-positive amounts
    /// are a no-op; neither touches state nor triggers a check.
    pub fn grant_experience(&self, user_id: &str, amount: i64, source: XpSource) -> Result<GrantResult> {
        let outcome = grant_experience(self.store.as_ref(), user_id, amount, &source)?;
        if outcome.xp_granted == 0 {
            return Ok(GrantResult {
                outcome,
                unlocked: Vec::new(),
            });
        }

        let unlocked = self.check_achievements(user_id)?;
        Ok(GrantResult { outcome, unlocked })
    }

    /// Administrative deduction.
    ///
    /// Lowers `total_xp` and the in-level XP by the raw amount (clamped at
    /// zero) but never lowers `level`: this is not the inverse of a grant.
    pub fn deduct_experience(&self, user_id: &str, amount: i64) -> Result<DeductOutcome> {
        deduct_experience(self.store.as_ref(), user_id, amount)
    }

    /// GetProgressionSnapshot
    pub fn snapshot(&self, user_id: &str) -> Result<ProgressionSnapshot> {
        let ledger = self.store.load_ledger(user_id)?;
        Ok(ProgressionSnapshot::from(&ledger))
    }

    // ========================================
    // STREAK OPERATIONS
    // ========================================

    /// Advance a streak for today's local date
    pub fn advance_streak(&self, user_id: &str, kind: &str) -> Result<StreakResult> {
        self.advance_streak_on(user_id, kind, today())
    }

    /// Advance a streak as of `date`. Any bonus is granted before the
    /// achievement check so streak and XP criteria see the new totals.
    pub fn advance_streak_on(&self, user_id: &str, kind: &str, date: NaiveDate) -> Result<StreakResult> {
        let (outcome, bonus) = self.advance_streak_unchecked(user_id, kind, date)?;
        let unlocked = if outcome.advanced {
            self.check_achievements(user_id)?
        } else {
            Vec::new()
        };
        Ok(StreakResult {
            outcome,
            bonus,
            unlocked,
        })
    }

    /// Advance the streak and pay its bonus in one store write
    fn advance_streak_unchecked(
        &self,
        user_id: &str,
        kind: &str,
        date: NaiveDate,
    ) -> Result<(StreakOutcome, Option<GrantOutcome>)> {
        let mut outcome = None;
        let mut bonus = None;
        let (streak, _) = self
            .store
            .update_streak_with_ledger(user_id, kind, &mut |streak, ledger| {
                let advanced = streak.advance(date);
                bonus = (advanced.bonus_xp > 0).then(|| {
                    let amount = i64::try_from(advanced.bonus_xp).unwrap_or(i64::MAX);
                    apply_grant_from(ledger, amount, &XpSource::StreakBonus)
                });
                outcome = Some(advanced);
            })?;
        let outcome = outcome.unwrap_or(StreakOutcome {
            advanced: false,
            current_count: streak.current_count,
            best_count: streak.best_count,
            bonus_xp: 0,
        });

        if !outcome.advanced {
            debug!(user_id, kind, "Streak already counted today");
            return Ok((outcome, None));
        }
        info!(user_id, kind, count = outcome.current_count, "Streak advanced");
        if let Some(bonus) = &bonus {
            let amount = i64::try_from(outcome.bonus_xp).unwrap_or(i64::MAX);
            log_grant(user_id, amount, &XpSource::StreakBonus, bonus);
        }
        Ok((outcome, bonus))
    }

    /// Claim the pending milestone bonus of a streak, if any.
    ///
    /// The claim marker and the XP are written together, so a failed
    /// grant leaves the milestone claimable.
    pub fn claim_streak_bonus(&self, user_id: &str, kind: &str) -> Result<Option<GrantResult>> {
        let Some(existing) = self.store.load_streak(user_id, kind)? else {
            return Ok(None);
        };
        if !existing.can_claim_bonus() {
            return Ok(None);
        }

        let mut claimed = None;
        let mut outcome = GrantOutcome::unchanged(1);
        self.store
            .update_streak_with_ledger(user_id, kind, &mut |streak, ledger| {
                claimed = streak.claim_bonus();
                outcome = match claimed {
                    Some(amount) => apply_grant_from(
                        ledger,
                        i64::try_from(amount).unwrap_or(i64::MAX),
                        &XpSource::StreakMilestone,
                    ),
                    None => GrantOutcome::unchanged(ledger.level),
                };
            })?;
        let Some(amount) = claimed else {
            return Ok(None);
        };

        info!(user_id, kind, amount, "Streak milestone bonus claimed");
        let amount = i64::try_from(amount).unwrap_or(i64::MAX);
        log_grant(user_id, amount, &XpSource::StreakMilestone, &outcome);

        let unlocked = if outcome.xp_granted > 0 {
            self.check_achievements(user_id)?
        } else {
            Vec::new()
        };
        Ok(Some(GrantResult { outcome, unlocked }))
    }

    /// Streaks of a user with activity recomputed for today
    pub fn streaks(&self, user_id: &str) -> Result<Vec<Streak>> {
        self.streaks_on(user_id, today())
    }

    pub fn streaks_on(&self, user_id: &str, date: NaiveDate) -> Result<Vec<Streak>> {
        let mut streaks = self.store.load_streaks(user_id)?;
        for streak in &mut streaks {
            streak.refresh(date);
        }
        Ok(streaks)
    }

    // ========================================
    // ACHIEVEMENT OPERATIONS
    // ========================================

    fn throttle_key(user_id: &str) -> String {
        format!("achievements:{user_id}")
    }

    /// Evaluate the catalog for a user.
    ///
    /// Suppressed (returns nothing, evaluates nothing) while a previous
    /// check for the same user is within the cool-down window. The marker
    /// is only set once a check completes successfully.
    pub fn check_achievements(&self, user_id: &str) -> Result<Vec<UnlockedAchievement>> {
        let throttled = !self.check_cooldown.is_zero();
        let key = Self::throttle_key(user_id);
        if throttled && self.throttle.contains(&key) {
            debug!(user_id, "Achievement check throttled");
            return Ok(Vec::new());
        }

        let unlocked = self.checker.evaluate_and_unlock(
            user_id,
            self.store.as_ref(),
            self.facts.as_ref(),
            self.catalog.as_ref(),
        )?;

        if throttled {
            self.throttle.put(&key, self.check_cooldown);
        }
        Ok(unlocked)
    }

    /// Evaluate bypassing the throttle (admin tooling, tests)
    pub fn force_check_achievements(&self, user_id: &str) -> Result<Vec<UnlockedAchievement>> {
        self.throttle.remove(&Self::throttle_key(user_id));
        self.check_achievements(user_id)
    }

    pub fn unlocked_achievements(&self, user_id: &str) -> Result<Vec<AchievementUnlock>> {
        self.store.unlocks(user_id)
    }

    // ========================================
    // DOMAIN EVENTS
    // ========================================

    /// Apply a named domain event from the event table.
    ///
    /// Streak advance and XP grant happen first, then a single achievement
    /// check covers both. Returns the events emitted, in order.
    pub fn handle_domain_event(
        &self,
        user_id: &str,
        event: &str,
        payload: &Value,
    ) -> Result<Vec<GamificationEvent>> {
        self.handle_domain_event_on(user_id, event, payload, today())
    }

    /// [`Self::handle_domain_event`] with streaks counted as of `date`
    pub fn handle_domain_event_on(
        &self,
        user_id: &str,
        event: &str,
        payload: &Value,
        date: NaiveDate,
    ) -> Result<Vec<GamificationEvent>> {
        let rule = domain_event(event).ok_or_else(|| ProgressionError::UnknownEvent(event.to_string()))?;
        let mut events = Vec::new();

        if rule.amount_from_payload {
            let amount = payload
                .get("amount")
                .and_then(Value::as_i64)
                .ok_or_else(|| ProgressionError::InvalidPayload {
                    event: event.to_string(),
                    message: "expected integer field 'amount'".to_string(),
                })?;

            if amount < 0 {
                let deducted = self.deduct_experience(user_id, amount.saturating_neg())?;
                events.push(GamificationEvent::XpDeducted {
                    amount: deducted.xp_deducted,
                });
                return Ok(events);
            }
            if amount > 0 {
                let outcome = grant_experience(self.store.as_ref(), user_id, amount, &rule.source)?;
                push_grant_events(&mut events, &outcome, &rule.source);
            }
        } else {
            if let Some(kind) = rule.streak {
                let (outcome, bonus) = self.advance_streak_unchecked(user_id, kind, date)?;
                if outcome.advanced {
                    events.push(GamificationEvent::StreakExtended {
                        kind: kind.to_string(),
                        count: outcome.current_count,
                        bonus_xp: outcome.bonus_xp,
                    });
                }
                if let Some(bonus) = bonus {
                    push_grant_events(&mut events, &bonus, &XpSource::StreakBonus);
                }
            }

            let xp = self.event_xp.get(rule.name).copied().unwrap_or(rule.xp);
            let amount = i64::try_from(xp).unwrap_or(i64::MAX);
            let outcome = grant_experience(self.store.as_ref(), user_id, amount, &rule.source)?;
            push_grant_events(&mut events, &outcome, &rule.source);
        }

        if events.is_empty() {
            return Ok(events);
        }

        for unlocked in self.check_achievements(user_id)? {
            let grant = unlocked.grant.clone();
            let source = XpSource::Achievement(unlocked.achievement.slug.clone());
            events.push(GamificationEvent::AchievementUnlocked(unlocked));
            push_grant_events(&mut events, &grant, &source);
        }
        Ok(events)
    }
}

fn push_grant_events(events: &mut Vec<GamificationEvent>, outcome: &GrantOutcome, source: &XpSource) {
    if outcome.xp_granted == 0 {
        return;
    }
    events.push(GamificationEvent::XpAwarded {
        amount: outcome.xp_granted,
        source: source.to_string(),
    });
    if outcome.leveled_up {
        events.push(GamificationEvent::LevelUp {
            old_level: outcome.old_level,
            new_level: outcome.new_level,
            title: title_for_level(outcome.new_level).to_string(),
        });
    }
}
