//! XP and Level system
//!
//! Defines the per-user progression ledger, level thresholds, titles,
//! and the grant/deduct arithmetic applied to a ledger value.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::events::XpSource;
use crate::error::Result;
use crate::store::ProgressionStore;

/// XP needed to leave level 1
pub const BASE_LEVEL_XP: u64 = 100;

/// Growth factor between consecutive level thresholds
pub const LEVEL_GROWTH: f64 = 1.5;

/// Highest reachable level. XP granted at the cap accrues in `current_level_xp`.
pub const MAX_LEVEL: u32 = 100;

/// XP required to advance out of `level`: `round(100 * 1.5^(level-1))`.
pub fn threshold(level: u32) -> u64 {
    let exp = level.max(1) - 1;
    let raw = BASE_LEVEL_XP as f64 * LEVEL_GROWTH.powi(exp as i32);
    if raw >= u64::MAX as f64 {
        u64::MAX
    } else {
        raw.round() as u64
    }
}

/// Title band (must be sorted by `min_level`)
#[derive(Debug, Clone)]
pub struct LevelTitle {
    pub min_level: u32,
    pub title: &'static str,
}

pub static LEVEL_TITLES: &[LevelTitle] = &[
    LevelTitle {
        min_level: 1,
        title: "Penny Pincher",
    },
    LevelTitle {
        min_level: 3,
        title: "Budget Rookie",
    },
    LevelTitle {
        min_level: 5,
        title: "Saver",
    },
    LevelTitle {
        min_level: 8,
        title: "Budget Builder",
    },
    LevelTitle {
        min_level: 12,
        title: "Money Manager",
    },
    LevelTitle {
        min_level: 16,
        title: "Wealth Strategist",
    },
    LevelTitle {
        min_level: 20,
        title: "Finance Guru",
    },
    LevelTitle {
        min_level: 25,
        title: "Financial Master",
    },
    LevelTitle {
        min_level: 30,
        title: "Money Legend",
    },
];

/// Title for a level (highest band whose `min_level` is reached)
pub fn title_for_level(level: u32) -> &'static str {
    LEVEL_TITLES
        .iter()
        .rev()
        .find(|t| level >= t.min_level)
        .unwrap_or(&LEVEL_TITLES[0])
        .title
}

/// Per-user progression record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub level: u32,
    pub total_xp: u64,
    /// XP earned inside the current level
    pub current_level_xp: u64,
    /// XP needed to leave the current level
    pub next_level_xp: u64,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            level: 1,
            total_xp: 0,
            current_level_xp: 0,
            next_level_xp: threshold(1),
        }
    }
}

/// Result of applying a grant to a ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantOutcome {
    pub xp_granted: u64,
    pub leveled_up: bool,
    pub old_level: u32,
    pub new_level: u32,
    pub levels_gained: u32,
}

impl GrantOutcome {
    /// Outcome of a grant that changed nothing
    pub fn unchanged(level: u32) -> Self {
        Self {
            xp_granted: 0,
            leveled_up: false,
            old_level: level,
            new_level: level,
            levels_gained: 0,
        }
    }
}

impl Ledger {
    /// Add XP and run the level-up loop. May cross several levels at once.
    pub fn apply_grant(&mut self, amount: u64) -> GrantOutcome {
        let old_level = self.level;
        if amount == 0 {
            return GrantOutcome::unchanged(old_level);
        }

        self.total_xp = self.total_xp.saturating_add(amount);
        self.current_level_xp = self.current_level_xp.saturating_add(amount);

        while self.level < MAX_LEVEL && self.current_level_xp >= self.next_level_xp {
            self.current_level_xp -= self.next_level_xp;
            self.level += 1;
            self.next_level_xp = threshold(self.level);
        }

        GrantOutcome {
            xp_granted: amount,
            leveled_up: self.level > old_level,
            old_level,
            new_level: self.level,
            levels_gained: self.level - old_level,
        }
    }

    /// Administrative correction. Lowers `total_xp` and `current_level_xp`
    /// by the raw amount (clamped at zero) and leaves `level` untouched:
    /// the level-up loop is NOT run in reverse.
    ///
    /// Returns the XP actually removed from `total_xp`.
    pub fn apply_deduction(&mut self, amount: u64) -> u64 {
        let before = self.total_xp;
        self.total_xp = self.total_xp.saturating_sub(amount);
        self.current_level_xp = self.current_level_xp.saturating_sub(amount);
        before - self.total_xp
    }

    /// Progress through the current level in percent (0.0 - 100.0)
    pub fn progress_percentage(&self) -> f64 {
        if self.next_level_xp == 0 {
            return 100.0;
        }
        let pct = self.current_level_xp as f64 / self.next_level_xp as f64 * 100.0;
        pct.min(100.0)
    }

    pub fn is_max_level(&self) -> bool {
        self.level >= MAX_LEVEL
    }

    pub fn title(&self) -> &'static str {
        title_for_level(self.level)
    }
}

/// Result of an administrative deduction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductOutcome {
    pub xp_deducted: u64,
    pub total_xp: u64,
    pub level: u32,
}

/// Apply a grant to a user's stored ledger.
///
/// Every XP award goes through here. Grants from a reserved source and
/// non-positive amounts leave the ledger untouched.
pub fn grant_experience(
    store: &dyn ProgressionStore,
    user_id: &str,
    amount: i64,
    source: &XpSource,
) -> Result<GrantOutcome> {
    if source.is_reserved() || amount <= 0 {
        let outcome = GrantOutcome::unchanged(store.load_ledger(user_id)?.level);
        log_grant(user_id, amount, source, &outcome);
        return Ok(outcome);
    }

    let mut outcome = GrantOutcome::unchanged(1);
    store.update_ledger(user_id, &mut |ledger| {
        outcome = apply_grant_from(ledger, amount, source);
    })?;
    log_grant(user_id, amount, source, &outcome);
    Ok(outcome)
}

/// Grant to a ledger already held inside a store write. Same rejection
/// rules as [`grant_experience`]; logging is left to [`log_grant`] since
/// store closures may run more than once.
pub(crate) fn apply_grant_from(ledger: &mut Ledger, amount: i64, source: &XpSource) -> GrantOutcome {
    if source.is_reserved() || amount <= 0 {
        return GrantOutcome::unchanged(ledger.level);
    }
    ledger.apply_grant(amount as u64)
}

pub(crate) fn log_grant(user_id: &str, amount: i64, source: &XpSource, outcome: &GrantOutcome) {
    if source.is_reserved() {
        warn!(user_id, amount, source = %source, "Rejected grant from reserved source");
        return;
    }
    if amount <= 0 {
        debug!(user_id, amount, source = %source, "Ignoring non-positive grant");
        return;
    }

    debug!(user_id, amount, source = %source, "XP granted");
    if outcome.leveled_up {
        info!(
            user_id,
            old_level = outcome.old_level,
            new_level = outcome.new_level,
            "Level up"
        );
    }
}

/// Administrative deduction, see [`Ledger::apply_deduction`].
/// Non-positive amounts are a no-op.
pub fn deduct_experience(store: &dyn ProgressionStore, user_id: &str, amount: i64) -> Result<DeductOutcome> {
    if amount <= 0 {
        let ledger = store.load_ledger(user_id)?;
        return Ok(DeductOutcome {
            xp_deducted: 0,
            total_xp: ledger.total_xp,
            level: ledger.level,
        });
    }

    let mut removed = 0;
    let ledger = store.update_ledger(user_id, &mut |ledger| {
        removed = ledger.apply_deduction(amount as u64);
    })?;

    info!(user_id, removed, total_xp = ledger.total_xp, "XP deducted");
    Ok(DeductOutcome {
        xp_deducted: removed,
        total_xp: ledger.total_xp,
        level: ledger.level,
    })
}

/// Read-only view of a ledger, as handed to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionSnapshot {
    pub level: u32,
    pub total_xp: u64,
    pub current_level_xp: u64,
    pub next_level_xp: u64,
    pub progress_percentage: f64,
    pub title: String,
}

impl From<&Ledger> for ProgressionSnapshot {
    fn from(ledger: &Ledger) -> Self {
        Self {
            level: ledger.level,
            total_xp: ledger.total_xp,
            current_level_xp: ledger.current_level_xp,
            next_level_xp: ledger.next_level_xp,
            progress_percentage: ledger.progress_percentage(),
            title: ledger.title().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_curve() {
        assert_eq!(threshold(1), 100);
        assert_eq!(threshold(2), 150);
        assert_eq!(threshold(3), 225);
        assert_eq!(threshold(4), 338); // 337.5 rounds up
        assert_eq!(threshold(5), 506);
        assert_eq!(threshold(0), 100);
    }

    #[test]
    fn test_exact_level_up() {
        let mut ledger = Ledger::default();
        let outcome = ledger.apply_grant(100);
        assert!(outcome.leveled_up);
        assert_eq!(outcome.new_level, 2);
        assert_eq!(ledger.current_level_xp, 0);
        assert_eq!(ledger.next_level_xp, 150);
    }

    #[test]
    fn test_bulk_grant_crosses_levels() {
        let mut ledger = Ledger::default();
        let outcome = ledger.apply_grant(1000);
        // 1000 - 100 - 150 - 225 - 338 = 187
        assert_eq!(outcome.old_level, 1);
        assert_eq!(outcome.new_level, 5);
        assert_eq!(outcome.levels_gained, 4);
        assert_eq!(ledger.current_level_xp, 187);
        assert_eq!(ledger.next_level_xp, 506);
        assert_eq!(ledger.total_xp, 1000);
    }

    #[test]
    fn test_zero_grant_is_noop() {
        let mut ledger = Ledger::default();
        let outcome = ledger.apply_grant(0);
        assert_eq!(outcome, GrantOutcome::unchanged(1));
        assert_eq!(ledger, Ledger::default());
    }

    #[test]
    fn test_max_level_accrues_excess() {
        let mut ledger = Ledger {
            level: MAX_LEVEL,
            total_xp: 10,
            current_level_xp: 10,
            next_level_xp: threshold(MAX_LEVEL),
        };
        let outcome = ledger.apply_grant(u64::MAX / 2);
        assert!(!outcome.leveled_up);
        assert_eq!(ledger.level, MAX_LEVEL);
        assert!(ledger.is_max_level());
    }

    #[test]
    fn test_deduction_is_asymmetric() {
        let mut ledger = Ledger::default();
        ledger.apply_grant(120); // level 2, 20 into it
        let removed = ledger.apply_deduction(50);
        assert_eq!(removed, 50);
        assert_eq!(ledger.total_xp, 70);
        assert_eq!(ledger.level, 2);
        assert_eq!(ledger.current_level_xp, 0);

        let removed = ledger.apply_deduction(500);
        assert_eq!(removed, 70);
        assert_eq!(ledger.total_xp, 0);
    }

    #[test]
    fn test_progress_and_title() {
        let mut ledger = Ledger::default();
        ledger.apply_grant(25);
        assert!((ledger.progress_percentage() - 25.0).abs() < f64::EPSILON);
        assert_eq!(ledger.title(), "Penny Pincher");

        let snapshot = ProgressionSnapshot::from(&ledger);
        assert_eq!(snapshot.level, 1);
        assert_eq!(snapshot.title, "Penny Pincher");
    }

    #[test]
    fn test_store_grant_rejects_reserved_source() {
        let store = crate::store::MemoryStore::new();
        grant_experience(&store, "u1", 40, &XpSource::Transaction).unwrap();

        let outcome = grant_experience(&store, "u1", 10_000, &XpSource::LevelBonus).unwrap();
        assert!(!outcome.leveled_up);
        assert_eq!(outcome.xp_granted, 0);
        assert_eq!(store.load_ledger("u1").unwrap().total_xp, 40);
    }

    #[test]
    fn test_store_grant_ignores_non_positive() {
        let store = crate::store::MemoryStore::new();
        let outcome = grant_experience(&store, "u1", -5, &XpSource::Admin).unwrap();
        assert_eq!(outcome, GrantOutcome::unchanged(1));
        let deducted = deduct_experience(&store, "u1", 0).unwrap();
        assert_eq!(deducted.xp_deducted, 0);
    }

    #[test]
    fn test_in_place_grant_applies_same_rules() {
        let mut ledger = Ledger::default();
        assert_eq!(
            apply_grant_from(&mut ledger, 500, &XpSource::LevelBonus),
            GrantOutcome::unchanged(1)
        );
        assert_eq!(apply_grant_from(&mut ledger, 0, &XpSource::StreakBonus).xp_granted, 0);
        assert_eq!(ledger, Ledger::default());

        let outcome = apply_grant_from(&mut ledger, 120, &XpSource::StreakBonus);
        assert!(outcome.leveled_up);
        assert_eq!(ledger.total_xp, 120);
    }

    #[test]
    fn test_title_bands() {
        assert_eq!(title_for_level(2), "Penny Pincher");
        assert_eq!(title_for_level(5), "Saver");
        assert_eq!(title_for_level(19), "Wealth Strategist");
        assert_eq!(title_for_level(99), "Money Legend");
    }
}
