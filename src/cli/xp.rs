//! XP and level commands

use anyhow::{Result, anyhow};

use finquest::XpSource;

use super::Context;

pub fn grant_command(ctx: &Context, amount: i64, source: &str) -> Result<()> {
    let source = XpSource::parse(source).ok_or_else(|| anyhow!("Unknown XP source: {source}"))?;
    let result = ctx.manager()?.grant_experience(&ctx.user, amount, source)?;

    ctx.emit(&result, |r| {
        if r.outcome.xp_granted == 0 {
            println!("No XP granted.");
            return;
        }
        println!("+{} XP", r.outcome.xp_granted);
        if r.outcome.leveled_up {
            println!("Level up! {} -> {}", r.outcome.old_level, r.outcome.new_level);
        }
        for unlocked in &r.unlocked {
            println!(
                "Achievement unlocked: {} (+{} XP)",
                unlocked.achievement.name, unlocked.achievement.xp_reward
            );
        }
    })
}

pub fn deduct_command(ctx: &Context, amount: i64) -> Result<()> {
    let outcome = ctx.manager()?.deduct_experience(&ctx.user, amount)?;
    ctx.emit(&outcome, |o| {
        println!("-{} XP (total {}, level {})", o.xp_deducted, o.total_xp, o.level);
    })
}

pub fn snapshot_command(ctx: &Context) -> Result<()> {
    let snapshot = ctx.manager()?.snapshot(&ctx.user)?;
    ctx.emit(&snapshot, |s| {
        println!("Level {} - {}", s.level, s.title);
        println!(
            "  {}/{} XP to next level ({:.1}%)",
            s.current_level_xp, s.next_level_xp, s.progress_percentage
        );
        println!("  Total XP: {}", s.total_xp);
    })
}
