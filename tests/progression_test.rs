//! End-to-end progression flows against the SQLite store

mod common;

use std::time::Duration;

use serde_json::json;

use finquest::progression::{CatalogFile, Criterion, GamificationEvent, XpSource, kinds};
use finquest::store::{FinancialFacts, ProgressionStore, SqliteStore};
use finquest::{ProgressionError, ProgressionManager};

use common::{achievement, day, sqlite_manager, temp_db};

#[test]
fn test_fresh_user_snapshot() {
    let (_dir, path) = temp_db();
    let manager = sqlite_manager(&path);

    let snapshot = manager.snapshot("new-user").unwrap();
    assert_eq!(snapshot.level, 1);
    assert_eq!(snapshot.total_xp, 0);
    assert_eq!(snapshot.current_level_xp, 0);
    assert_eq!(snapshot.next_level_xp, 100);
    assert_eq!(snapshot.progress_percentage, 0.0);
    assert!(manager.streaks("new-user").unwrap().is_empty());
    assert!(manager.unlocked_achievements("new-user").unwrap().is_empty());
}

#[test]
fn test_bulk_grant_crosses_several_levels() {
    let (_dir, path) = temp_db();
    let manager = sqlite_manager(&path);

    let result = manager.grant_experience("u1", 1000, XpSource::Admin).unwrap();
    assert_eq!(result.outcome.old_level, 1);
    assert_eq!(result.outcome.levels_gained, 4);

    // 1000 XP reaches level 5, which unlocks the builtin level_5 reward
    assert!(result.unlocked.iter().any(|u| u.achievement.slug == "level_5"));
    let snapshot = manager.snapshot("u1").unwrap();
    assert_eq!(snapshot.level, 5);
    assert_eq!(snapshot.total_xp, 1050);
    assert_eq!(snapshot.current_level_xp, 237);
    assert_eq!(snapshot.next_level_xp, 506);
}

#[test]
fn test_state_survives_reopen() {
    let (_dir, path) = temp_db();
    {
        let manager = sqlite_manager(&path);
        manager.grant_experience("u1", 120, XpSource::Transaction).unwrap();
        manager
            .advance_streak_on("u1", kinds::DAILY_LOGIN, day(0))
            .unwrap();
        manager
            .advance_streak_on("u1", kinds::DAILY_LOGIN, day(1))
            .unwrap();
    }

    let manager = sqlite_manager(&path);
    let snapshot = manager.snapshot("u1").unwrap();
    assert_eq!(snapshot.level, 2);
    assert_eq!(snapshot.current_level_xp, 20);

    let streaks = manager.streaks_on("u1", day(1)).unwrap();
    assert_eq!(streaks.len(), 1);
    assert_eq!(streaks[0].current_count, 2);
    assert!(streaks[0].is_active);

    // Two days without activity: stored count stays, but the streak reads as broken
    let later = manager.streaks_on("u1", day(3)).unwrap();
    assert_eq!(later[0].current_count, 2);
    assert!(!later[0].is_active);
}

#[test]
fn test_streak_gap_resets_and_best_is_kept() {
    let (_dir, path) = temp_db();
    let manager = sqlite_manager(&path);

    for d in 0..5 {
        manager
            .advance_streak_on("u1", kinds::DAILY_TRANSACTION, day(d))
            .unwrap();
    }
    let reset = manager
        .advance_streak_on("u1", kinds::DAILY_TRANSACTION, day(7))
        .unwrap();
    assert!(reset.outcome.advanced);
    assert_eq!(reset.outcome.current_count, 1);
    assert_eq!(reset.outcome.best_count, 5);

    // Going back in time counts as already recorded
    let stale = manager
        .advance_streak_on("u1", kinds::DAILY_TRANSACTION, day(6))
        .unwrap();
    assert!(!stale.outcome.advanced);
}

#[test]
fn test_week_of_logins_unlocks_and_pays_milestone() {
    let (_dir, path) = temp_db();
    let manager = sqlite_manager(&path);

    let mut unlocked = Vec::new();
    let mut bonus = 0;
    for d in 0..7 {
        let result = manager
            .advance_streak_on("u1", kinds::DAILY_LOGIN, day(d))
            .unwrap();
        bonus += result.bonus.map(|b| b.xp_granted).unwrap_or(0);
        unlocked.extend(result.unlocked.into_iter().map(|u| u.achievement.slug));
    }
    // Day 3 pays 10, day 7 pays 50
    assert_eq!(bonus, 60);
    assert_eq!(unlocked, vec!["regular_visitor".to_string()]);

    let claimed = manager
        .claim_streak_bonus("u1", kinds::DAILY_LOGIN)
        .unwrap()
        .unwrap();
    assert_eq!(claimed.outcome.xp_granted, 25);
    assert!(manager
        .claim_streak_bonus("u1", kinds::DAILY_LOGIN)
        .unwrap()
        .is_none());

    // 60 streak bonus + 30 achievement + 25 milestone
    assert_eq!(manager.snapshot("u1").unwrap().total_xp, 115);
}

#[test]
fn test_domain_events_drive_facts_based_unlocks() {
    let (_dir, path) = temp_db();
    let store = SqliteStore::open(&path).unwrap();
    let manager = ProgressionManager::from_sqlite(store.clone())
        .with_check_cooldown(std::time::Duration::ZERO);

    store
        .record_facts(
            "u1",
            &FinancialFacts {
                bank_connections: 1,
                ..Default::default()
            },
        )
        .unwrap();

    let events = manager
        .handle_domain_event("u1", "bank_connection", &json!({}))
        .unwrap();

    let unlocked: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            GamificationEvent::AchievementUnlocked(u) => Some(u.achievement.slug.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(unlocked, vec!["first_bank"]);
    assert!(events
        .iter()
        .any(|e| matches!(e, GamificationEvent::LevelUp { new_level: 2, .. })));

    // 100 for the connection, 25 for the achievement
    assert_eq!(store.load_ledger("u1").unwrap().total_xp, 125);

    // Repeating the event never re-awards the achievement
    manager
        .handle_domain_event("u1", "bank_connection", &json!({}))
        .unwrap();
    assert_eq!(store.unlocks("u1").unwrap().len(), 1);
    assert_eq!(store.load_ledger("u1").unwrap().total_xp, 225);
}

#[test]
fn test_unknown_event_and_bad_payload() {
    let (_dir, path) = temp_db();
    let manager = sqlite_manager(&path);

    let err = manager
        .handle_domain_event("u1", "win_lottery", &json!({}))
        .unwrap_err();
    assert!(matches!(err, ProgressionError::UnknownEvent(ref name) if name == "win_lottery"));

    let err = manager
        .handle_domain_event("u1", "admin_adjustment", &json!({}))
        .unwrap_err();
    assert!(matches!(err, ProgressionError::InvalidPayload { .. }));
    assert_eq!(manager.snapshot("u1").unwrap().total_xp, 0);
}

#[test]
fn test_level_bonus_never_reaches_the_ledger() {
    let (_dir, path) = temp_db();
    let manager = sqlite_manager(&path);

    let result = manager
        .grant_experience("u1", 500, XpSource::LevelBonus)
        .unwrap();
    assert_eq!(result.outcome.xp_granted, 0);
    assert_eq!(manager.snapshot("u1").unwrap().total_xp, 0);
}

#[test]
fn test_imported_catalog_from_each_format() {
    let (dir, path) = temp_db();

    let json_path = dir.path().join("catalog.json");
    std::fs::write(
        &json_path,
        json!({
            "achievements": [{
                "id": "ach_big_saver",
                "slug": "big_saver",
                "name": "Big Saver",
                "rarity": "epic",
                "xp_reward": 500,
                "criteria": {"kind": "minCumulativeSavings", "value": 5000}
            }]
        })
        .to_string(),
    )
    .unwrap();

    let yaml_path = dir.path().join("catalog.yaml");
    std::fs::write(
        &yaml_path,
        r#"
achievements:
  - id: ach_syncer
    slug: syncer
    name: Syncer
    rarity: uncommon
    xp_reward: 20
    criteria:
      kind: minSyncCount
      value: 3
"#,
    )
    .unwrap();

    let toml_path = dir.path().join("catalog.toml");
    std::fs::write(
        &toml_path,
        r#"
[[achievements]]
id = "ach_future"
slug = "future"
name = "From The Future"
rarity = "legendary"
xp_reward = 1
active = true

[achievements.criteria]
kind = "minNetWorth"
value = 1
"#,
    )
    .unwrap();

    let store = SqliteStore::open(&path).unwrap();
    for file in [&json_path, &yaml_path, &toml_path] {
        let catalog = CatalogFile::from_path(file).unwrap();
        assert_eq!(store.import_catalog(&catalog.achievements).unwrap(), 1);
    }

    store
        .record_facts(
            "u1",
            &FinancialFacts {
                cumulative_savings: 6000.0,
                sync_count: 3,
                ..Default::default()
            },
        )
        .unwrap();

    let manager = ProgressionManager::from_sqlite(store.clone());
    let slugs: Vec<String> = manager
        .check_achievements("u1")
        .unwrap()
        .into_iter()
        .map(|u| u.achievement.slug)
        .collect();

    // Builtin saver_1k qualifies too; the unknown criteria kind never unlocks
    assert!(slugs.contains(&"big_saver".to_string()));
    assert!(slugs.contains(&"syncer".to_string()));
    assert!(slugs.contains(&"saver_1k".to_string()));
    assert!(!slugs.contains(&"future".to_string()));
}

#[test]
fn test_catalog_file_rejects_unknown_extension() {
    let (dir, _) = temp_db();
    let path = dir.path().join("catalog.ini");
    std::fs::write(&path, "").unwrap();
    assert!(CatalogFile::from_path(&path).is_err());
}

#[test]
fn test_custom_achievement_with_memory_store() {
    let (store, manager) = common::memory_manager(vec![achievement(
        "goal_setter",
        15,
        Criterion::MinGoalsCreated { value: 2 },
    )]);
    store.update_facts("u1", |f| f.goals_created = 2).unwrap();

    let events = manager
        .handle_domain_event("u1", "create_goal", &json!({}))
        .unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, GamificationEvent::AchievementUnlocked(_))));
    assert_eq!(store.load_ledger("u1").unwrap().total_xp, 35);
}

#[test]
fn test_failed_reward_write_is_paid_on_retry() {
    let (_dir, path) = temp_db();
    let store = SqliteStore::open(&path).unwrap();
    store
        .import_catalog(&[achievement("welcome", 40, Criterion::MinTotalXp { value: 0 })])
        .unwrap();
    let manager = ProgressionManager::from_sqlite(store.clone()).with_check_cooldown(Duration::ZERO);

    // A second connection makes every ledger update fail
    let side = rusqlite::Connection::open(&path).unwrap();
    side.execute_batch(
        "CREATE TRIGGER ledger_offline BEFORE UPDATE ON ledgers
         BEGIN SELECT RAISE(ABORT, 'ledger offline'); END;",
    )
    .unwrap();

    assert!(manager.check_achievements("u1").is_err());
    assert!(store.unlocked_ids("u1").unwrap().is_empty());
    assert_eq!(store.load_ledger("u1").unwrap().total_xp, 0);

    side.execute_batch("DROP TRIGGER ledger_offline;").unwrap();

    let unlocked = manager.check_achievements("u1").unwrap();
    assert_eq!(unlocked.len(), 1);
    assert_eq!(unlocked[0].achievement.slug, "welcome");
    assert_eq!(store.load_ledger("u1").unwrap().total_xp, 40);
    assert_eq!(manager.unlocked_achievements("u1").unwrap().len(), 1);
}
