//! Streak tracking system
//!
//! Consecutive-day counters per (user, streak kind), the automatic
//! per-advance bonus, and manually claimed milestone bonuses.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Well-known streak kinds. Kinds are opaque strings, any value is accepted.
pub mod kinds {
    pub const DAILY_LOGIN: &str = "daily_login";
    pub const DAILY_TRANSACTION: &str = "daily_transaction";
    pub const WEEKLY_SAVINGS: &str = "weekly_savings";
    pub const BANK_SYNC: &str = "bank_sync";
}

/// Date format used when streak dates are persisted
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One consecutive-day counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
    pub user_id: String,
    pub kind: String,
    pub current_count: u32,
    pub best_count: u32,
    pub last_activity_date: Option<NaiveDate>,
    pub is_active: bool,
    /// Highest milestone (in days) whose bonus has been claimed
    pub last_claimed_milestone: u32,
}

/// Result of advancing a streak
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakOutcome {
    pub advanced: bool,
    pub current_count: u32,
    pub best_count: u32,
    pub bonus_xp: u64,
}

/// Manually claimable milestone
#[derive(Debug, Clone)]
pub struct StreakMilestone {
    pub days: u32,
    pub bonus_xp: u64,
}

/// Claimable milestones (must be sorted by `days`)
pub static STREAK_MILESTONES: &[StreakMilestone] = &[
    StreakMilestone {
        days: 7,
        bonus_xp: 25,
    },
    StreakMilestone {
        days: 14,
        bonus_xp: 50,
    },
    StreakMilestone {
        days: 30,
        bonus_xp: 150,
    },
    StreakMilestone {
        days: 60,
        bonus_xp: 300,
    },
    StreakMilestone {
        days: 100,
        bonus_xp: 750,
    },
    StreakMilestone {
        days: 365,
        bonus_xp: 2000,
    },
];

/// Automatic bonus for reaching `count` consecutive days.
///
/// Highest matching tier wins. Day 3 is an exact match, not a `>=` tier,
/// so days 4-6 earn nothing.
pub fn streak_bonus_xp(count: u32) -> u64 {
    match count {
        c if c >= 100 => 1000,
        c if c >= 50 => 500,
        c if c >= 30 => 200,
        c if c >= 14 => 100,
        c if c >= 7 => 50,
        3 => 10,
        _ => 0,
    }
}

impl Streak {
    pub fn new(user_id: &str, kind: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            kind: kind.to_string(),
            current_count: 0,
            best_count: 0,
            last_activity_date: None,
            is_active: false,
            last_claimed_milestone: 0,
        }
    }

    /// Record activity on `today`.
    ///
    /// Same day is a no-op. The day after the last activity extends the
    /// streak, any longer gap restarts it at 1. A `today` earlier than the
    /// recorded activity is treated as already counted.
    pub fn advance(&mut self, today: NaiveDate) -> StreakOutcome {
        let days_since = self.last_activity_date.map(|last| (today - last).num_days());

        match days_since {
            Some(d) if d <= 0 => {
                return StreakOutcome {
                    advanced: false,
                    current_count: self.current_count,
                    best_count: self.best_count,
                    bonus_xp: 0,
                };
            }
            Some(1) => self.current_count += 1,
            _ => self.current_count = 1,
        }

        self.best_count = self.best_count.max(self.current_count);
        self.last_activity_date = Some(today);
        self.is_active = true;

        StreakOutcome {
            advanced: true,
            current_count: self.current_count,
            best_count: self.best_count,
            bonus_xp: streak_bonus_xp(self.current_count),
        }
    }

    /// Active if the last activity was today or yesterday
    pub fn is_active_on(&self, today: NaiveDate) -> bool {
        let Some(last) = self.last_activity_date else {
            return false;
        };
        let days_since = (today - last).num_days();
        (0..=1).contains(&days_since)
    }

    /// Recompute `is_active` against `today`
    pub fn refresh(&mut self, today: NaiveDate) {
        self.is_active = self.is_active_on(today);
    }

    /// Highest reached milestone that has not been claimed yet
    pub fn claimable_milestone(&self) -> Option<&'static StreakMilestone> {
        STREAK_MILESTONES
            .iter()
            .rev()
            .find(|m| m.days <= self.current_count)
            .filter(|m| m.days > self.last_claimed_milestone)
    }

    pub fn can_claim_bonus(&self) -> bool {
        self.claimable_milestone().is_some()
    }

    /// Claim the pending milestone bonus. Each milestone pays out at most once.
    pub fn claim_bonus(&mut self) -> Option<u64> {
        let milestone = self.claimable_milestone()?;
        self.last_claimed_milestone = milestone.days;
        Some(milestone.bonus_xp)
    }
}

/// Today's date in local time
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_same_day_is_noop() {
        let mut streak = Streak::new("u1", kinds::DAILY_LOGIN);
        let first = streak.advance(day(1));
        assert!(first.advanced);
        assert_eq!(first.current_count, 1);

        let second = streak.advance(day(1));
        assert!(!second.advanced);
        assert_eq!(second.current_count, 1);
        assert_eq!(second.bonus_xp, 0);
    }

    #[test]
    fn test_consecutive_day_extends() {
        let mut streak = Streak::new("u1", kinds::DAILY_TRANSACTION);
        streak.advance(day(1));
        let outcome = streak.advance(day(2));
        assert!(outcome.advanced);
        assert_eq!(outcome.current_count, 2);
    }

    #[test]
    fn test_gap_resets_but_keeps_best() {
        let mut streak = Streak::new("u1", kinds::DAILY_TRANSACTION);
        streak.advance(day(1));
        streak.advance(day(2));
        streak.advance(day(3));
        let outcome = streak.advance(day(6));
        assert_eq!(outcome.current_count, 1);
        assert_eq!(outcome.best_count, 3);
    }

    #[test]
    fn test_earlier_date_is_ignored() {
        let mut streak = Streak::new("u1", kinds::BANK_SYNC);
        streak.advance(day(5));
        let outcome = streak.advance(day(4));
        assert!(!outcome.advanced);
        assert_eq!(streak.last_activity_date, Some(day(5)));
    }

    #[test]
    fn test_bonus_tiers() {
        assert_eq!(streak_bonus_xp(1), 0);
        assert_eq!(streak_bonus_xp(2), 0);
        assert_eq!(streak_bonus_xp(3), 10);
        assert_eq!(streak_bonus_xp(4), 0);
        assert_eq!(streak_bonus_xp(6), 0);
        assert_eq!(streak_bonus_xp(7), 50);
        assert_eq!(streak_bonus_xp(13), 50);
        assert_eq!(streak_bonus_xp(14), 100);
        assert_eq!(streak_bonus_xp(30), 200);
        assert_eq!(streak_bonus_xp(50), 500);
        assert_eq!(streak_bonus_xp(100), 1000);
        assert_eq!(streak_bonus_xp(400), 1000);
    }

    #[test]
    fn test_third_day_pays_bonus() {
        let mut streak = Streak::new("u1", kinds::DAILY_LOGIN);
        streak.advance(day(1));
        streak.advance(day(2));
        let outcome = streak.advance(day(3));
        assert_eq!(outcome.bonus_xp, 10);
    }

    #[test]
    fn test_is_active_on() {
        let mut streak = Streak::new("u1", kinds::DAILY_LOGIN);
        assert!(!streak.is_active_on(day(1)));
        streak.advance(day(1));
        assert!(streak.is_active_on(day(1)));
        assert!(streak.is_active_on(day(2)));
        assert!(!streak.is_active_on(day(3)));

        streak.refresh(day(3));
        assert!(!streak.is_active);
    }

    #[test]
    fn test_milestone_claimed_once() {
        let mut streak = Streak::new("u1", kinds::DAILY_LOGIN);
        for d in 1..=6 {
            streak.advance(day(d));
        }
        assert!(!streak.can_claim_bonus());

        streak.advance(day(7));
        assert!(streak.can_claim_bonus());
        assert_eq!(streak.claim_bonus(), Some(25));
        assert!(!streak.can_claim_bonus());
        assert_eq!(streak.claim_bonus(), None);

        // Falling back below and re-reaching 7 days does not pay again
        streak.advance(day(20));
        for d in 21..=26 {
            streak.advance(day(d));
        }
        assert_eq!(streak.current_count, 7);
        assert!(!streak.can_claim_bonus());
    }

    #[test]
    fn test_claim_skips_to_highest_reached() {
        let mut streak = Streak::new("u1", kinds::DAILY_LOGIN);
        streak.current_count = 15;
        streak.best_count = 15;
        assert_eq!(streak.claim_bonus(), Some(50));
        assert_eq!(streak.last_claimed_milestone, 14);
    }
}
