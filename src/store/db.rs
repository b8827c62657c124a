//! SQLite store with automatic schema migration
//!
//! Ledger and streak rows carry a `version` column. Updates read the row,
//! apply the caller's closure, and write back with `WHERE version = ?`;
//! a lost race re-reads and re-applies, up to `max_retries` attempts.
//! Unlock rows rely on `UNIQUE(user_id, achievement_id)`. Writes that pair
//! an unlock or a streak with a ledger grant share one IMMEDIATE transaction.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use serde_json::Value;
use tracing::warn;

use super::{AchievementUnlock, CatalogStore, FactProvider, FinancialFacts, ProgressionStore};
use crate::error::{ProgressionError, Result};
use crate::progression::{AchievementDefinition, BUILTIN_CATALOG, DATE_FORMAT, Ledger, Rarity, Streak};

/// Default optimistic-update attempts per key
pub const DEFAULT_MAX_RETRIES: u32 = 8;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    max_retries: u32,
}

/// SQLite integers are signed; counters saturate at `i64::MAX` on write.
fn to_db(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn from_db(v: i64) -> u64 {
    v.max(0) as u64
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl SqliteStore {
    /// Open or create the progression database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            max_retries: DEFAULT_MAX_RETRIES,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ProgressionError::LockPoisoned("sqlite connection"))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA_SQL)?;
        drop(conn);
        self.run_migrations()
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        let version: i32 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))
            .unwrap_or(0);

        // Migration 2: milestone claims on streaks
        if version < 2 {
            let has_claim_column: bool = conn
                .prepare(
                    "SELECT COUNT(*) FROM pragma_table_info('streaks') WHERE name = 'last_claimed_milestone'",
                )
                .and_then(|mut s| s.query_row([], |r| r.get::<_, i32>(0)))
                .map(|c| c > 0)
                .unwrap_or(false);

            if !has_claim_column {
                conn.execute_batch(
                    "ALTER TABLE streaks ADD COLUMN last_claimed_milestone INTEGER NOT NULL DEFAULT 0;",
                )?;
            }
            conn.execute("INSERT OR REPLACE INTO schema_version VALUES (2)", [])?;
        }

        // Migration 3: seed the builtin catalog into an empty definitions table
        if version < 3 {
            let existing: i64 =
                conn.query_row("SELECT COUNT(*) FROM achievement_definitions", [], |r| r.get(0))?;
            drop(conn);
            if existing == 0 {
                self.import_catalog(&BUILTIN_CATALOG)?;
            }
            self.conn()?
                .execute("INSERT OR REPLACE INTO schema_version VALUES (3)", [])?;
        }

        Ok(())
    }

    // ========================================
    // CATALOG
    // ========================================

    /// Insert or replace definitions by id. Returns the number written.
    pub fn import_catalog(&self, definitions: &[AchievementDefinition]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = now_ms();
        for def in definitions {
            tx.execute(
                r#"
                INSERT INTO achievement_definitions
                    (id, slug, name, description, rarity, xp_reward, criteria, active, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(id) DO UPDATE SET
                    slug = excluded.slug, name = excluded.name,
                    description = excluded.description, rarity = excluded.rarity,
                    xp_reward = excluded.xp_reward, criteria = excluded.criteria,
                    active = excluded.active, updated_at = excluded.updated_at
                "#,
                params![
                    def.id,
                    def.slug,
                    def.name,
                    def.description,
                    def.rarity.as_str(),
                    to_db(def.xp_reward),
                    def.criteria.to_string(),
                    def.active,
                    now,
                ],
            )?;
        }
        tx.commit()?;
        Ok(definitions.len())
    }

    /// All definitions, inactive ones included
    pub fn all_definitions(&self) -> Result<Vec<AchievementDefinition>> {
        self.load_definitions(false)
    }

    fn load_definitions(&self, active_only: bool) -> Result<Vec<AchievementDefinition>> {
        let conn = self.conn()?;
        let sql = if active_only {
            "SELECT id, slug, name, description, rarity, xp_reward, criteria, active
             FROM achievement_definitions WHERE active = 1 ORDER BY id"
        } else {
            "SELECT id, slug, name, description, rarity, xp_reward, criteria, active
             FROM achievement_definitions ORDER BY id"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], definition_from_row)?;
        let mut definitions = Vec::new();
        for row in rows {
            definitions.push(row?);
        }
        Ok(definitions)
    }

    // ========================================
    // FACTS
    // ========================================

    /// Upsert the aggregate facts the host application computed for a user
    pub fn record_facts(&self, user_id: &str, facts: &FinancialFacts) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO user_facts
                (user_id, transaction_count, goals_created, goals_completed, cumulative_savings,
                 bank_connections, sync_count, categorized_transactions, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(user_id) DO UPDATE SET
                transaction_count = ?2, goals_created = ?3, goals_completed = ?4,
                cumulative_savings = ?5, bank_connections = ?6, sync_count = ?7,
                categorized_transactions = ?8, updated_at = ?9
            "#,
            params![
                user_id,
                to_db(facts.transaction_count),
                to_db(facts.goals_created),
                to_db(facts.goals_completed),
                facts.cumulative_savings,
                to_db(facts.bank_connections),
                to_db(facts.sync_count),
                to_db(facts.categorized_transactions),
                now_ms(),
            ],
        )?;
        Ok(())
    }

    fn read_facts(&self, user_id: &str) -> Result<FinancialFacts> {
        let conn = self.conn()?;
        let facts = conn
            .query_row(
                r#"
                SELECT transaction_count, goals_created, goals_completed, cumulative_savings,
                       bank_connections, sync_count, categorized_transactions
                FROM user_facts WHERE user_id = ?1
                "#,
                [user_id],
                |r| {
                    Ok(FinancialFacts {
                        transaction_count: from_db(r.get(0)?),
                        goals_created: from_db(r.get(1)?),
                        goals_completed: from_db(r.get(2)?),
                        cumulative_savings: r.get(3)?,
                        bank_connections: from_db(r.get(4)?),
                        sync_count: from_db(r.get(5)?),
                        categorized_transactions: from_db(r.get(6)?),
                    })
                },
            )
            .optional()?;
        Ok(facts.unwrap_or_default())
    }
}

fn definition_from_row(r: &Row<'_>) -> rusqlite::Result<AchievementDefinition> {
    let id: String = r.get(0)?;
    let rarity: String = r.get(4)?;
    let criteria: String = r.get(6)?;

    let criteria = serde_json::from_str::<Value>(&criteria).unwrap_or_else(|e| {
        warn!(achievement = %id, error = %e, "Stored criteria is not valid JSON");
        Value::String(criteria.clone())
    });

    Ok(AchievementDefinition {
        slug: r.get(1)?,
        name: r.get(2)?,
        description: r.get(3)?,
        rarity: rarity.parse().unwrap_or(Rarity::Common),
        xp_reward: from_db(r.get(5)?),
        criteria,
        active: r.get(7)?,
        id,
    })
}

fn read_ledger(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<(Ledger, i64)>> {
    conn.query_row(
        "SELECT level, total_xp, current_level_xp, next_level_xp, version FROM ledgers WHERE user_id = ?1",
        [user_id],
        |r| {
            Ok((
                Ledger {
                    level: r.get(0)?,
                    total_xp: from_db(r.get(1)?),
                    current_level_xp: from_db(r.get(2)?),
                    next_level_xp: from_db(r.get(3)?),
                },
                r.get(4)?,
            ))
        },
    )
    .optional()
}

const STREAK_COLUMNS: &str = "user_id, kind, current_count, best_count, last_activity_day, \
                              is_active, last_claimed_milestone, version";

fn streak_from_row(r: &Row<'_>) -> rusqlite::Result<(Streak, i64)> {
    let last_day: Option<String> = r.get(4)?;
    Ok((
        Streak {
            user_id: r.get(0)?,
            kind: r.get(1)?,
            current_count: r.get(2)?,
            best_count: r.get(3)?,
            last_activity_date: last_day
                .and_then(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT).ok()),
            is_active: r.get(5)?,
            last_claimed_milestone: r.get(6)?,
        },
        r.get(7)?,
    ))
}

fn read_streak(conn: &Connection, user_id: &str, kind: &str) -> rusqlite::Result<Option<(Streak, i64)>> {
    conn.query_row(
        &format!("SELECT {STREAK_COLUMNS} FROM streaks WHERE user_id = ?1 AND kind = ?2"),
        [user_id, kind],
        streak_from_row,
    )
    .optional()
}

/// Read-apply-write one ledger row. `None` when the version moved underneath.
fn write_ledger(
    conn: &Connection,
    user_id: &str,
    apply: &mut dyn FnMut(&mut Ledger),
) -> rusqlite::Result<Option<Ledger>> {
    let initial = Ledger::default();
    conn.execute(
        r#"
        INSERT OR IGNORE INTO ledgers
            (user_id, level, total_xp, current_level_xp, next_level_xp, version, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
        "#,
        params![
            user_id,
            initial.level,
            to_db(initial.total_xp),
            to_db(initial.current_level_xp),
            to_db(initial.next_level_xp),
            now_ms(),
        ],
    )?;

    let Some((mut ledger, version)) = read_ledger(conn, user_id)? else {
        return Ok(None);
    };
    apply(&mut ledger);

    let changed = conn.execute(
        r#"
        UPDATE ledgers SET
            level = ?1, total_xp = ?2, current_level_xp = ?3, next_level_xp = ?4,
            version = version + 1, updated_at = ?5
        WHERE user_id = ?6 AND version = ?7
        "#,
        params![
            ledger.level,
            to_db(ledger.total_xp),
            to_db(ledger.current_level_xp),
            to_db(ledger.next_level_xp),
            now_ms(),
            user_id,
            version,
        ],
    )?;
    Ok((changed == 1).then_some(ledger))
}

/// Read-apply-write one streak row. `None` when the version moved underneath.
fn write_streak(
    conn: &Connection,
    user_id: &str,
    kind: &str,
    apply: &mut dyn FnMut(&mut Streak),
) -> rusqlite::Result<Option<Streak>> {
    conn.execute(
        "INSERT OR IGNORE INTO streaks (user_id, kind, updated_at) VALUES (?1, ?2, ?3)",
        params![user_id, kind, now_ms()],
    )?;

    let Some((mut streak, version)) = read_streak(conn, user_id, kind)? else {
        return Ok(None);
    };
    apply(&mut streak);

    let changed = conn.execute(
        r#"
        UPDATE streaks SET
            current_count = ?1, best_count = ?2, last_activity_day = ?3, is_active = ?4,
            last_claimed_milestone = ?5, version = version + 1, updated_at = ?6
        WHERE user_id = ?7 AND kind = ?8 AND version = ?9
        "#,
        params![
            streak.current_count,
            streak.best_count,
            streak
                .last_activity_date
                .map(|d| d.format(DATE_FORMAT).to_string()),
            streak.is_active,
            streak.last_claimed_milestone,
            now_ms(),
            user_id,
            kind,
            version,
        ],
    )?;
    Ok((changed == 1).then_some(streak))
}

fn insert_unlock_row(conn: &Connection, unlock: &AchievementUnlock) -> rusqlite::Result<bool> {
    let inserted = conn.execute(
        r#"
        INSERT OR IGNORE INTO achievement_unlocks (id, user_id, achievement_id, unlocked_at)
        VALUES (?1, ?2, ?3, ?4)
        "#,
        params![unlock.id, unlock.user_id, unlock.achievement_id, unlock.unlocked_at],
    )?;
    Ok(inserted == 1)
}

impl ProgressionStore for SqliteStore {
    fn load_ledger(&self, user_id: &str) -> Result<Ledger> {
        let conn = self.conn()?;
        Ok(read_ledger(&conn, user_id)?
            .map(|(ledger, _)| ledger)
            .unwrap_or_default())
    }

    fn update_ledger(&self, user_id: &str, apply: &mut dyn FnMut(&mut Ledger)) -> Result<Ledger> {
        for attempt in 1..=self.max_retries {
            let conn = self.conn()?;
            if let Some(ledger) = write_ledger(&conn, user_id, apply)? {
                return Ok(ledger);
            }
            warn!(user_id, attempt, "Ledger version conflict, retrying");
        }

        Err(ProgressionError::Conflict {
            key: format!("ledger:{user_id}"),
            attempts: self.max_retries,
        })
    }

    fn load_streak(&self, user_id: &str, kind: &str) -> Result<Option<Streak>> {
        let conn = self.conn()?;
        Ok(read_streak(&conn, user_id, kind)?.map(|(streak, _)| streak))
    }

    fn load_streaks(&self, user_id: &str) -> Result<Vec<Streak>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {STREAK_COLUMNS} FROM streaks WHERE user_id = ?1 ORDER BY kind"
        ))?;
        let rows = stmt.query_map([user_id], streak_from_row)?;
        let mut streaks = Vec::new();
        for row in rows {
            streaks.push(row?.0);
        }
        Ok(streaks)
    }

    fn update_streak(
        &self,
        user_id: &str,
        kind: &str,
        apply: &mut dyn FnMut(&mut Streak),
    ) -> Result<Streak> {
        for attempt in 1..=self.max_retries {
            let conn = self.conn()?;
            if let Some(streak) = write_streak(&conn, user_id, kind, apply)? {
                return Ok(streak);
            }
            warn!(user_id, kind, attempt, "Streak version conflict, retrying");
        }

        Err(ProgressionError::Conflict {
            key: format!("streak:{user_id}:{kind}"),
            attempts: self.max_retries,
        })
    }

    fn unlock_with_grant(
        &self,
        unlock: &AchievementUnlock,
        apply: &mut dyn FnMut(&mut Ledger),
    ) -> Result<Option<Ledger>> {
        for attempt in 1..=self.max_retries {
            let mut conn = self.conn()?;
            // Dropping the transaction on any early return rolls back both rows
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if !insert_unlock_row(&tx, unlock)? {
                return Ok(None);
            }
            if let Some(ledger) = write_ledger(&tx, &unlock.user_id, apply)? {
                tx.commit()?;
                return Ok(Some(ledger));
            }
            warn!(user_id = %unlock.user_id, attempt, "Ledger version conflict during unlock, retrying");
        }

        Err(ProgressionError::Conflict {
            key: format!("ledger:{}", unlock.user_id),
            attempts: self.max_retries,
        })
    }

    fn update_streak_with_ledger(
        &self,
        user_id: &str,
        kind: &str,
        apply: &mut dyn FnMut(&mut Streak, &mut Ledger),
    ) -> Result<(Streak, Ledger)> {
        for attempt in 1..=self.max_retries {
            let mut conn = self.conn()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let mut ledger_write = Ok(None);
            let streak = write_streak(&tx, user_id, kind, &mut |streak| {
                ledger_write = write_ledger(&tx, user_id, &mut |ledger| apply(streak, ledger));
            })?;
            if let (Some(streak), Some(ledger)) = (streak, ledger_write?) {
                tx.commit()?;
                return Ok((streak, ledger));
            }
            warn!(user_id, kind, attempt, "Version conflict during streak update, retrying");
        }

        Err(ProgressionError::Conflict {
            key: format!("streak:{user_id}:{kind}"),
            attempts: self.max_retries,
        })
    }

    fn unlocked_ids(&self, user_id: &str) -> Result<HashSet<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT achievement_id FROM achievement_unlocks WHERE user_id = ?1")?;
        let ids = stmt
            .query_map([user_id], |row| row.get(0))?
            .collect::<rusqlite::Result<HashSet<String>>>()?;
        Ok(ids)
    }

    fn unlocks(&self, user_id: &str) -> Result<Vec<AchievementUnlock>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, user_id, achievement_id, unlocked_at FROM achievement_unlocks
            WHERE user_id = ?1 ORDER BY unlocked_at, achievement_id
            "#,
        )?;
        let unlocks = stmt
            .query_map([user_id], |r| {
                Ok(AchievementUnlock {
                    id: r.get(0)?,
                    user_id: r.get(1)?,
                    achievement_id: r.get(2)?,
                    unlocked_at: r.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(unlocks)
    }
}

impl FactProvider for SqliteStore {
    fn facts(&self, user_id: &str) -> Result<FinancialFacts> {
        self.read_facts(user_id).map_err(|e| match e {
            ProgressionError::Storage(err) => ProgressionError::FactsUnavailable(err.to_string()),
            other => other,
        })
    }
}

impl CatalogStore for SqliteStore {
    fn active_definitions(&self) -> Result<Vec<AchievementDefinition>> {
        self.load_definitions(true).map_err(|e| match e {
            ProgressionError::Storage(err) => ProgressionError::CatalogUnavailable(err.to_string()),
            other => other,
        })
    }
}

/// Base schema (version 1)
const SCHEMA_SQL: &str = r#"
-- Per-user progression ledger
CREATE TABLE IF NOT EXISTS ledgers (
    user_id TEXT PRIMARY KEY,
    level INTEGER NOT NULL DEFAULT 1,
    total_xp INTEGER NOT NULL DEFAULT 0,
    current_level_xp INTEGER NOT NULL DEFAULT 0,
    next_level_xp INTEGER NOT NULL DEFAULT 100,
    version INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER
);

-- Consecutive-day streaks per (user, kind)
CREATE TABLE IF NOT EXISTS streaks (
    user_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    current_count INTEGER NOT NULL DEFAULT 0,
    best_count INTEGER NOT NULL DEFAULT 0,
    last_activity_day TEXT,
    is_active INTEGER NOT NULL DEFAULT 0,
    version INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER,
    PRIMARY KEY (user_id, kind)
);

-- Unlocked achievements (at most one row per user and achievement)
CREATE TABLE IF NOT EXISTS achievement_unlocks (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    achievement_id TEXT NOT NULL,
    unlocked_at INTEGER NOT NULL,
    UNIQUE (user_id, achievement_id)
);
CREATE INDEX IF NOT EXISTS idx_unlocks_user ON achievement_unlocks(user_id);

-- Achievement catalog
CREATE TABLE IF NOT EXISTS achievement_definitions (
    id TEXT PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    rarity TEXT NOT NULL DEFAULT 'common',
    xp_reward INTEGER NOT NULL DEFAULT 0,
    criteria TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    updated_at INTEGER
);

-- Aggregate facts supplied by the host application
CREATE TABLE IF NOT EXISTS user_facts (
    user_id TEXT PRIMARY KEY,
    transaction_count INTEGER NOT NULL DEFAULT 0,
    goals_created INTEGER NOT NULL DEFAULT 0,
    goals_completed INTEGER NOT NULL DEFAULT 0,
    cumulative_savings REAL NOT NULL DEFAULT 0.0,
    bank_connections INTEGER NOT NULL DEFAULT 0,
    sync_count INTEGER NOT NULL DEFAULT 0,
    categorized_transactions INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER
);

-- Schema version
CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);
INSERT OR IGNORE INTO schema_version VALUES (1);
"#;
