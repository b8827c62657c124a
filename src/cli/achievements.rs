//! Achievement and catalog commands

use std::path::Path;

use anyhow::Result;
use tracing::info;

use finquest::progression::CatalogFile;

use super::Context;

pub fn check_command(ctx: &Context, force: bool) -> Result<()> {
    let manager = ctx.manager()?;
    let unlocked = if force {
        manager.force_check_achievements(&ctx.user)?
    } else {
        manager.check_achievements(&ctx.user)?
    };

    ctx.emit(&unlocked, |unlocked| {
        if unlocked.is_empty() {
            println!("No new achievements.");
        }
        for u in unlocked {
            println!(
                "Unlocked [{}] {} - {} (+{} XP)",
                u.achievement.rarity.as_str(),
                u.achievement.name,
                u.achievement.description,
                u.achievement.xp_reward
            );
        }
    })
}

pub fn unlocked_command(ctx: &Context) -> Result<()> {
    let unlocks = ctx.manager()?.unlocked_achievements(&ctx.user)?;
    ctx.emit(&unlocks, |unlocks| {
        println!("Achievements ({}):\n", unlocks.len());
        for u in unlocks {
            println!("  {} (at {})", u.achievement_id, u.unlocked_at);
        }
    })
}

pub fn import_command(ctx: &Context, path: &Path) -> Result<()> {
    let catalog = CatalogFile::from_path(path)?;
    let count = ctx.store()?.import_catalog(&catalog.achievements)?;
    info!(count, path = %path.display(), "Imported achievement catalog");

    ctx.emit(&count, |count| println!("Imported {count} achievement definitions."))
}

pub fn catalog_command(ctx: &Context) -> Result<()> {
    let definitions = ctx.store()?.all_definitions()?;
    ctx.emit(&definitions, |definitions| {
        for d in definitions {
            let state = if d.active { "" } else { " (inactive)" };
            println!(
                "  {:<22} {:<10} {:>5} XP  {}{}",
                d.slug,
                d.rarity.as_str(),
                d.xp_reward,
                d.name,
                state
            );
        }
    })
}
