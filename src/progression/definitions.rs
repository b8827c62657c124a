//! Achievement definitions and metadata
//!
//! Definitions come from a catalog store. Criteria are kept as the raw
//! tagged JSON the catalog holds so that kinds this build does not know
//! about still load; [`Criterion`] is the typed form used for authoring.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::streaks::kinds;

/// Achievement rarity, for display ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Uncommon => "uncommon",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
        }
    }

}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown rarity '{0}'")]
pub struct UnknownRarity(pub String);

impl FromStr for Rarity {
    type Err = UnknownRarity;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "common" => Ok(Self::Common),
            "uncommon" => Ok(Self::Uncommon),
            "rare" => Ok(Self::Rare),
            "epic" => Ok(Self::Epic),
            "legendary" => Ok(Self::Legendary),
            other => Err(UnknownRarity(other.to_string())),
        }
    }
}

/// Achievement definition as stored in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementDefinition {
    pub id: String,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub rarity: Rarity,
    pub xp_reward: u64,
    /// Tagged predicate, e.g. `{"kind":"minTransactionCount","value":10}`
    pub criteria: Value,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Typed unlock condition.
///
/// Serializes to the catalog's tagged format:
/// `{"kind":"streakAtLeast","streakKind":"daily_transaction","value":7}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Criterion {
    MinTransactionCount {
        value: u64,
    },
    MinGoalsCreated {
        value: u64,
    },
    MinGoalsCompleted {
        value: u64,
    },
    StreakAtLeast {
        #[serde(rename = "streakKind")]
        streak_kind: String,
        value: u32,
    },
    MinCumulativeSavings {
        value: f64,
    },
    MinBankConnections {
        value: u64,
    },
    MinSyncCount {
        value: u64,
    },
    MinCategorizedTransactions {
        value: u64,
    },
    MinLevel {
        value: u32,
    },
    MinTotalXp {
        value: u64,
    },
}

impl Criterion {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MinTransactionCount { .. } => "minTransactionCount",
            Self::MinGoalsCreated { .. } => "minGoalsCreated",
            Self::MinGoalsCompleted { .. } => "minGoalsCompleted",
            Self::StreakAtLeast { .. } => "streakAtLeast",
            Self::MinCumulativeSavings { .. } => "minCumulativeSavings",
            Self::MinBankConnections { .. } => "minBankConnections",
            Self::MinSyncCount { .. } => "minSyncCount",
            Self::MinCategorizedTransactions { .. } => "minCategorizedTransactions",
            Self::MinLevel { .. } => "minLevel",
            Self::MinTotalXp { .. } => "minTotalXp",
        }
    }

    /// Catalog representation
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Kind tag of a raw criteria value, if present
pub fn criteria_kind(criteria: &Value) -> Option<&str> {
    criteria.get("kind").and_then(Value::as_str)
}

impl AchievementDefinition {
    pub fn new(
        slug: &str,
        name: &str,
        description: &str,
        rarity: Rarity,
        xp_reward: u64,
        criterion: Criterion,
    ) -> Self {
        Self {
            id: format!("ach_{slug}"),
            slug: slug.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            rarity,
            xp_reward,
            criteria: criterion.to_value(),
            active: true,
        }
    }
}

/// Definitions used when no catalog has been imported
pub static BUILTIN_CATALOG: Lazy<Vec<AchievementDefinition>> = Lazy::new(|| {
    use Criterion::*;
    vec![
        // === TRANSACTIONS ===
        AchievementDefinition::new(
            "first_transaction",
            "First Entry",
            "Record your first transaction",
            Rarity::Common,
            10,
            MinTransactionCount { value: 1 },
        ),
        AchievementDefinition::new(
            "ten_transactions",
            "Bookkeeper",
            "Record 10 transactions",
            Rarity::Common,
            25,
            MinTransactionCount { value: 10 },
        ),
        AchievementDefinition::new(
            "hundred_transactions",
            "Ledger Keeper",
            "Record 100 transactions",
            Rarity::Rare,
            100,
            MinTransactionCount { value: 100 },
        ),
        AchievementDefinition::new(
            "categorizer",
            "Neat Freak",
            "Categorize 50 transactions",
            Rarity::Uncommon,
            50,
            MinCategorizedTransactions { value: 50 },
        ),
        // === GOALS ===
        AchievementDefinition::new(
            "first_goal",
            "Dreamer",
            "Create your first savings goal",
            Rarity::Common,
            15,
            MinGoalsCreated { value: 1 },
        ),
        AchievementDefinition::new(
            "goal_achiever",
            "Goal Getter",
            "Complete a savings goal",
            Rarity::Uncommon,
            50,
            MinGoalsCompleted { value: 1 },
        ),
        AchievementDefinition::new(
            "three_goals",
            "Overachiever",
            "Complete 3 savings goals",
            Rarity::Rare,
            150,
            MinGoalsCompleted { value: 3 },
        ),
        // === SAVINGS ===
        AchievementDefinition::new(
            "saver_1k",
            "Nest Egg",
            "Save 1,000 in total",
            Rarity::Uncommon,
            75,
            MinCumulativeSavings { value: 1_000.0 },
        ),
        AchievementDefinition::new(
            "saver_10k",
            "Piggy Bank Tycoon",
            "Save 10,000 in total",
            Rarity::Epic,
            300,
            MinCumulativeSavings { value: 10_000.0 },
        ),
        // === BANKING ===
        AchievementDefinition::new(
            "first_bank",
            "Connected",
            "Connect your first bank account",
            Rarity::Common,
            25,
            MinBankConnections { value: 1 },
        ),
        AchievementDefinition::new(
            "sync_regular",
            "In Sync",
            "Sync your accounts 10 times",
            Rarity::Uncommon,
            40,
            MinSyncCount { value: 10 },
        ),
        // === STREAKS ===
        AchievementDefinition::new(
            "week_tracker",
            "Week Tracker",
            "Log transactions 7 days in a row",
            Rarity::Uncommon,
            75,
            StreakAtLeast {
                streak_kind: kinds::DAILY_TRANSACTION.to_string(),
                value: 7,
            },
        ),
        AchievementDefinition::new(
            "month_tracker",
            "Month Tracker",
            "Log transactions 30 days in a row",
            Rarity::Epic,
            300,
            StreakAtLeast {
                streak_kind: kinds::DAILY_TRANSACTION.to_string(),
                value: 30,
            },
        ),
        AchievementDefinition::new(
            "regular_visitor",
            "Regular",
            "Log in 7 days in a row",
            Rarity::Common,
            30,
            StreakAtLeast {
                streak_kind: kinds::DAILY_LOGIN.to_string(),
                value: 7,
            },
        ),
        // === LEVELS ===
        AchievementDefinition::new(
            "level_5",
            "Rising Saver",
            "Reach level 5",
            Rarity::Uncommon,
            50,
            MinLevel { value: 5 },
        ),
        AchievementDefinition::new(
            "level_10",
            "Seasoned Saver",
            "Reach level 10",
            Rarity::Legendary,
            200,
            MinLevel { value: 10 },
        ),
    ]
});

/// On-disk catalog file (`[[achievements]]` entries)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub achievements: Vec<AchievementDefinition>,
}

impl CatalogFile {
    /// Load a catalog from a `.json`, `.yaml`/`.yml` or `.toml` file
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let catalog: CatalogFile = match ext.as_str() {
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON catalog: {}", path.display()))?,
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML catalog: {}", path.display()))?,
            "toml" => toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML catalog: {}", path.display()))?,
            other => bail!("Unsupported catalog format '{}': {}", other, path.display()),
        };

        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rarity_parses_stored_names() {
        for rarity in [Rarity::Common, Rarity::Uncommon, Rarity::Rare, Rarity::Epic, Rarity::Legendary] {
            assert_eq!(rarity.as_str().parse::<Rarity>(), Ok(rarity));
        }
        assert_eq!(
            "mythic".parse::<Rarity>(),
            Err(UnknownRarity("mythic".to_string()))
        );
    }

    #[test]
    fn test_criterion_wire_format() {
        let c = Criterion::StreakAtLeast {
            streak_kind: "daily_transaction".to_string(),
            value: 7,
        };
        assert_eq!(
            c.to_value(),
            json!({"kind": "streakAtLeast", "streakKind": "daily_transaction", "value": 7})
        );

        let parsed: Criterion =
            serde_json::from_value(json!({"kind": "minTransactionCount", "value": 10})).unwrap();
        assert_eq!(parsed, Criterion::MinTransactionCount { value: 10 });
        assert_eq!(parsed.kind(), "minTransactionCount");
    }

    #[test]
    fn test_builtin_catalog_is_consistent() {
        let mut slugs: Vec<&str> = BUILTIN_CATALOG.iter().map(|a| a.slug.as_str()).collect();
        let total = slugs.len();
        slugs.sort_unstable();
        slugs.dedup();
        assert_eq!(slugs.len(), total, "duplicate slug in builtin catalog");

        for def in BUILTIN_CATALOG.iter() {
            let kind = criteria_kind(&def.criteria).unwrap();
            let typed: Criterion = serde_json::from_value(def.criteria.clone()).unwrap();
            assert_eq!(typed.kind(), kind);
        }
    }

    #[test]
    fn test_catalog_file_formats() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("catalog.toml");
        std::fs::write(
            &toml_path,
            r#"
[[achievements]]
id = "a1"
slug = "big_spender"
name = "Big Spender"
rarity = "rare"
xp_reward = 40
criteria = { kind = "minTransactionCount", value = 500 }
"#,
        )
        .unwrap();
        let catalog = CatalogFile::from_path(&toml_path).unwrap();
        assert_eq!(catalog.achievements.len(), 1);
        assert!(catalog.achievements[0].active);
        assert_eq!(catalog.achievements[0].rarity, Rarity::Rare);

        let json_path = dir.path().join("catalog.json");
        std::fs::write(
            &json_path,
            r#"{"achievements":[{"id":"a2","slug":"s","name":"S","rarity":"common",
                "xp_reward":5,"criteria":{"kind":"futureKind"},"active":false}]}"#,
        )
        .unwrap();
        let catalog = CatalogFile::from_path(&json_path).unwrap();
        assert!(!catalog.achievements[0].active);
        assert_eq!(criteria_kind(&catalog.achievements[0].criteria), Some("futureKind"));

        let bad = dir.path().join("catalog.ini");
        std::fs::write(&bad, "x").unwrap();
        assert!(CatalogFile::from_path(&bad).is_err());
    }
}
