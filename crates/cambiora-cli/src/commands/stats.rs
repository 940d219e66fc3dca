use clap::Subcommand;
use cambiora_core::DateKey;

use super::{open_engine, print_json, CommandResult};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Total XP, global streak and last activity day
    Show,
    /// XP earned per event, newest first
    History {
        /// First day to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<DateKey>,
        /// Last day to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<DateKey>,
    },
}

pub fn run(action: StatsAction) -> CommandResult {
    let (engine, config) = open_engine()?;

    match action {
        StatsAction::Show => print_json(&engine.stats(&config.user_id)?)?,
        StatsAction::History { from, to } => {
            print_json(&engine.xp_history(&config.user_id, from, to)?)?
        }
    }
    Ok(())
}
