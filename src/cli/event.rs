//! Domain event command

use anyhow::{Context as _, Result};
use serde_json::Value;

use finquest::GamificationEvent;

use super::Context;

pub fn event_command(ctx: &Context, name: &str, payload: Option<&str>) -> Result<()> {
    let payload: Value = match payload {
        Some(raw) => serde_json::from_str(raw).with_context(|| "Payload must be valid JSON")?,
        None => Value::Null,
    };

    let events = ctx.manager()?.handle_domain_event(&ctx.user, name, &payload)?;

    ctx.emit(&events, |events| {
        for event in events {
            match event {
                GamificationEvent::XpAwarded { amount, source } => println!("+{amount} XP ({source})"),
                GamificationEvent::XpDeducted { amount } => println!("-{amount} XP"),
                GamificationEvent::LevelUp {
                    old_level,
                    new_level,
                    title,
                } => println!("Level up! {old_level} -> {new_level} ({title})"),
                GamificationEvent::StreakExtended { kind, count, .. } => {
                    println!("{kind} streak: {count} days")
                }
                GamificationEvent::AchievementUnlocked(u) => {
                    println!("Achievement unlocked: {}", u.achievement.name)
                }
            }
        }
    })
}
