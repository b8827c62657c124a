//! Streak commands

use anyhow::{Context as _, Result};
use chrono::NaiveDate;

use finquest::progression::{DATE_FORMAT, today};

use super::Context;

pub fn advance_command(ctx: &Context, kind: &str, date: Option<&str>) -> Result<()> {
    let date = match date {
        Some(s) => NaiveDate::parse_from_str(s, DATE_FORMAT)
            .with_context(|| format!("Invalid date '{s}', expected YYYY-MM-DD"))?,
        None => today(),
    };
    let result = ctx.manager()?.advance_streak_on(&ctx.user, kind, date)?;

    ctx.emit(&result, |r| {
        if !r.outcome.advanced {
            println!("{kind}: already counted ({} days)", r.outcome.current_count);
            return;
        }
        println!(
            "{kind}: {} days (best {})",
            r.outcome.current_count, r.outcome.best_count
        );
        if let Some(bonus) = &r.bonus {
            println!("  Streak bonus: +{} XP", bonus.xp_granted);
        }
        for unlocked in &r.unlocked {
            println!("  Achievement unlocked: {}", unlocked.achievement.name);
        }
    })
}

pub fn claim_command(ctx: &Context, kind: &str) -> Result<()> {
    let claimed = ctx.manager()?.claim_streak_bonus(&ctx.user, kind)?;
    ctx.emit(&claimed, |c| match c {
        Some(r) => println!("Claimed {kind} milestone: +{} XP", r.outcome.xp_granted),
        None => println!("No milestone bonus to claim for {kind}."),
    })
}

pub fn list_command(ctx: &Context) -> Result<()> {
    let streaks = ctx.manager()?.streaks(&ctx.user)?;
    ctx.emit(&streaks, |streaks| {
        if streaks.is_empty() {
            println!("No streaks yet.");
            return;
        }
        for s in streaks {
            let state = if s.is_active { "active" } else { "broken" };
            let last = s
                .last_activity_date
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<18} {:>4} days  best {:>4}  last {}  [{}]",
                s.kind, s.current_count, s.best_count, last, state
            );
        }
    })
}
