//! Grant sources, the domain-event table, and emitted gamification events

use std::fmt;

use serde::{Deserialize, Serialize};

use super::checker::UnlockedAchievement;
use super::streaks::kinds;

/// Where granted XP comes from.
///
/// `LevelBonus` is reserved: grants carrying it are always rejected.
/// Level-up bonuses once re-entered the grant path and looped without
/// bound; the variant exists so such a grant is recognisable and refused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XpSource {
    Transaction,
    Categorization,
    GoalCreated,
    GoalCompleted,
    Budget,
    BankConnection,
    Sync,
    Login,
    Savings,
    /// Reward for an unlocked achievement (carries the slug)
    Achievement(String),
    StreakBonus,
    StreakMilestone,
    Admin,
    LevelBonus,
}

impl XpSource {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Transaction => "transaction",
            Self::Categorization => "categorization",
            Self::GoalCreated => "goal_created",
            Self::GoalCompleted => "goal_completed",
            Self::Budget => "budget",
            Self::BankConnection => "bank_connection",
            Self::Sync => "sync",
            Self::Login => "login",
            Self::Savings => "savings",
            Self::Achievement(_) => "achievement",
            Self::StreakBonus => "streak_bonus",
            Self::StreakMilestone => "streak_milestone",
            Self::Admin => "admin",
            Self::LevelBonus => "level_bonus",
        }
    }

    /// Parse a source label (`achievement:<slug>` for achievement rewards)
    pub fn parse(s: &str) -> Option<Self> {
        if let Some(slug) = s.strip_prefix("achievement:") {
            return (!slug.is_empty()).then(|| Self::Achievement(slug.to_string()));
        }
        match s {
            "transaction" => Some(Self::Transaction),
            "categorization" => Some(Self::Categorization),
            "goal_created" => Some(Self::GoalCreated),
            "goal_completed" => Some(Self::GoalCompleted),
            "budget" => Some(Self::Budget),
            "bank_connection" => Some(Self::BankConnection),
            "sync" => Some(Self::Sync),
            "login" => Some(Self::Login),
            "savings" => Some(Self::Savings),
            "streak_bonus" => Some(Self::StreakBonus),
            "streak_milestone" => Some(Self::StreakMilestone),
            "admin" => Some(Self::Admin),
            "level_bonus" => Some(Self::LevelBonus),
            _ => None,
        }
    }

    /// Sources that must never reach the ledger
    pub fn is_reserved(&self) -> bool {
        matches!(self, Self::LevelBonus)
    }
}

impl fmt::Display for XpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Achievement(slug) => write!(f, "achievement:{slug}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// How a named domain event maps onto progression
#[derive(Debug, Clone)]
pub struct DomainEventRule {
    pub name: &'static str,
    pub xp: u64,
    pub source: XpSource,
    /// Streak advanced alongside the grant
    pub streak: Option<&'static str>,
    /// XP is read from the payload's signed `amount` (negative deducts)
    pub amount_from_payload: bool,
}

const fn rule(name: &'static str, xp: u64, source: XpSource, streak: Option<&'static str>) -> DomainEventRule {
    DomainEventRule {
        name,
        xp,
        source,
        streak,
        amount_from_payload: false,
    }
}

pub static DOMAIN_EVENTS: &[DomainEventRule] = &[
    rule("process_transaction", 5, XpSource::Transaction, Some(kinds::DAILY_TRANSACTION)),
    rule("create_transaction", 5, XpSource::Transaction, Some(kinds::DAILY_TRANSACTION)),
    rule("categorize_transaction", 2, XpSource::Categorization, None),
    rule("create_goal", 20, XpSource::GoalCreated, None),
    rule("complete_goal", 50, XpSource::GoalCompleted, None),
    rule("create_budget", 15, XpSource::Budget, None),
    rule("bank_connection", 100, XpSource::BankConnection, None),
    rule("manual_sync", 10, XpSource::Sync, Some(kinds::BANK_SYNC)),
    rule("webhook_sync", 5, XpSource::Sync, Some(kinds::BANK_SYNC)),
    rule("daily_login", 2, XpSource::Login, Some(kinds::DAILY_LOGIN)),
    rule("savings_deposit", 10, XpSource::Savings, Some(kinds::WEEKLY_SAVINGS)),
    DomainEventRule {
        name: "admin_adjustment",
        xp: 0,
        source: XpSource::Admin,
        streak: None,
        amount_from_payload: true,
    },
];

/// Look up a domain event by name
pub fn domain_event(name: &str) -> Option<&'static DomainEventRule> {
    DOMAIN_EVENTS.iter().find(|r| r.name == name)
}

/// Things that happened while handling a call, in order
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GamificationEvent {
    XpAwarded {
        amount: u64,
        source: String,
    },
    XpDeducted {
        amount: u64,
    },
    LevelUp {
        old_level: u32,
        new_level: u32,
        title: String,
    },
    StreakExtended {
        kind: String,
        count: u32,
        bonus_xp: u64,
    },
    AchievementUnlocked(UnlockedAchievement),
}
