//! Init command implementation

use anyhow::{Result, bail};
use std::path::Path;
use tracing::info;

use finquest::config::Config;

/// Default configuration content for finquest init
pub const DEFAULT_CONFIG: &str = r#"# FinQuest Configuration
# ======================

[progression]
# Repeated achievement checks for the same user within this many seconds
# are skipped. 0 disables the cool-down.
achievement_check_cooldown_secs = 60

# Attempts per optimistic ledger/streak update before reporting a conflict
max_update_retries = 8

# Override the XP paid by individual domain events
[progression.event_xp]
# create_goal = 20
# bank_connection = 100

[storage]
# Defaults to ~/.finquest/progression.db
# database_path = "/path/to/progression.db"
"#;

/// Write the default config to `path` or ~/.finquest/config.toml
pub fn init_command(path: Option<&Path>, force: bool) -> Result<()> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(Config::global_config_path);

    if config_path.exists() && !force {
        bail!(
            "Config file already exists: {}\nUse --force to overwrite.",
            config_path.display()
        );
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&config_path, DEFAULT_CONFIG)?;

    info!("Created config file: {}", config_path.display());
    println!("Created {}", config_path.display());
    Ok(())
}
