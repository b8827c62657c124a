//! Gamification layer: XP, levels, streaks and achievements
//!
//! [`ProgressionManager`] is the entry point. The submodules hold the pure
//! state transitions ([`Ledger`], [`Streak`]) and the catalog evaluation
//! ([`AchievementChecker`]), all persisted through [`crate::store`].

mod checker;
mod definitions;
mod events;
mod levels;
mod manager;
mod streaks;
mod throttle;

pub use checker::{
    AchievementChecker, CriteriaError, FactSheet, PredicateFn, PredicateRegistry, UnlockedAchievement,
};
pub use definitions::{
    AchievementDefinition, BUILTIN_CATALOG, CatalogFile, Criterion, Rarity, UnknownRarity,
    criteria_kind,
};
pub use events::{DOMAIN_EVENTS, DomainEventRule, GamificationEvent, XpSource, domain_event};
pub use levels::{
    BASE_LEVEL_XP, DeductOutcome, GrantOutcome, LEVEL_GROWTH, LEVEL_TITLES, LevelTitle, Ledger, MAX_LEVEL,
    ProgressionSnapshot, deduct_experience, grant_experience, threshold, title_for_level,
};
pub use manager::{DEFAULT_CHECK_COOLDOWN, GrantResult, ProgressionManager, StreakResult};
pub use streaks::{
    DATE_FORMAT, STREAK_MILESTONES, Streak, StreakMilestone, StreakOutcome, kinds, streak_bonus_xp, today,
};
pub use throttle::{InMemoryTtlCache, NoopTtlCache, TtlCache};
