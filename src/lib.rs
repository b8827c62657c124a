//! FinQuest - progression core for a personal-finance app
//!
//! Turns financial activity into experience points, levels, daily streaks
//! and achievement unlocks.
//!
//! ## Layout
//!
//! - [`progression`]: ledger and streak transitions, the achievement
//!   evaluator and [`ProgressionManager`], the entry point for callers.
//! - [`store`]: persistence traits plus the SQLite and in-memory backends.
//! - [`config`]: TOML configuration (`~/.finquest/config.toml`).

pub mod config;
pub mod error;
pub mod progression;
pub mod store;

pub use error::{ProgressionError, Result};
pub use progression::{GamificationEvent, ProgressionManager, XpSource};
