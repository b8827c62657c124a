//! Financial facts command

use anyhow::{Context as _, Result};

use finquest::store::{FactProvider, FinancialFacts};

use super::Context;

pub fn facts_command(ctx: &Context, set: Option<&str>) -> Result<()> {
    let store = ctx.store()?;

    if let Some(raw) = set {
        let facts: FinancialFacts =
            serde_json::from_str(raw).with_context(|| "Facts must be a JSON object")?;
        store.record_facts(&ctx.user, &facts)?;
    }

    let facts = store.facts(&ctx.user)?;
    ctx.emit(&facts, |f| {
        println!("Transactions:   {} ({} categorized)", f.transaction_count, f.categorized_transactions);
        println!("Goals:          {} created, {} completed", f.goals_created, f.goals_completed);
        println!("Savings:        {:.2}", f.cumulative_savings);
        println!("Bank:           {} connections, {} syncs", f.bank_connections, f.sync_count);
    })
}
