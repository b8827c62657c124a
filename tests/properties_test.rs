//! Property tests for ledger and streak transitions

use chrono::{Days, NaiveDate};
use proptest::prelude::*;

use finquest::progression::{Ledger, MAX_LEVEL, Streak, threshold};

fn xp_spent_below(level: u32) -> u64 {
    (1..level).map(threshold).sum()
}

proptest! {
    #[test]
    fn grants_keep_ledger_consistent(amounts in prop::collection::vec(0u64..10_000, 1..20)) {
        let mut ledger = Ledger::default();
        let mut granted = 0u64;

        for amount in amounts {
            let before = ledger.level;
            let outcome = ledger.apply_grant(amount);
            granted += amount;

            prop_assert!(ledger.level >= before);
            prop_assert_eq!(outcome.new_level - outcome.old_level, outcome.levels_gained);
            prop_assert_eq!(outcome.leveled_up, outcome.levels_gained > 0);
            prop_assert!(ledger.level >= 1 && ledger.level < MAX_LEVEL);
            prop_assert!(ledger.current_level_xp < ledger.next_level_xp);
            prop_assert_eq!(ledger.next_level_xp, threshold(ledger.level));
            prop_assert_eq!(ledger.total_xp, granted);
            prop_assert_eq!(ledger.total_xp, xp_spent_below(ledger.level) + ledger.current_level_xp);
        }
    }

    #[test]
    fn split_grants_match_one_bulk_grant(a in 0u64..50_000, b in 0u64..50_000) {
        let mut split = Ledger::default();
        split.apply_grant(a);
        split.apply_grant(b);

        let mut bulk = Ledger::default();
        bulk.apply_grant(a + b);

        prop_assert_eq!(split, bulk);
    }

    #[test]
    fn deductions_never_lower_level(grant in 0u64..20_000, deduct in 0u64..40_000) {
        let mut ledger = Ledger::default();
        ledger.apply_grant(grant);
        let level = ledger.level;

        let removed = ledger.apply_deduction(deduct);
        prop_assert_eq!(removed, deduct.min(grant));
        prop_assert_eq!(ledger.total_xp, grant - removed);
        prop_assert_eq!(ledger.level, level);
    }

    #[test]
    fn streak_best_is_monotonic(steps in prop::collection::vec(0u64..4, 1..60)) {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut streak = Streak::new("u1", "daily_login");
        let mut offset = 0u64;
        let mut best = 0;

        for step in steps {
            offset += step;
            let date = start + Days::new(offset);
            let outcome = streak.advance(date);

            prop_assert!(streak.best_count >= best);
            prop_assert!(streak.best_count >= streak.current_count);
            prop_assert!(streak.current_count >= 1);
            prop_assert_eq!(streak.last_activity_date, Some(date));
            prop_assert_eq!(outcome.advanced, step > 0 || best == 0);
            best = streak.best_count;
        }
    }
}
