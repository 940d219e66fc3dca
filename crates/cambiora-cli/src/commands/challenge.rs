use chrono::Utc;
use clap::Subcommand;

use super::{open_engine, print_json, CommandResult};

#[derive(Subcommand)]
pub enum ChallengeAction {
    /// List today's challenges, one per active habit
    List,
    /// Complete one of today's challenges, or undo it if already completed
    Toggle {
        /// Challenge ID (from `challenge list`)
        id: String,
    },
}

pub fn run(action: ChallengeAction) -> CommandResult {
    let (engine, config) = open_engine()?;

    match action {
        ChallengeAction::List => {
            let challenges = engine.daily_challenges(&config.user_id, Utc::now())?;
            print_json(&challenges)?;
        }
        ChallengeAction::Toggle { id } => {
            let toggle = engine.toggle_daily_challenge(&config.user_id, &id, Utc::now())?;
            print_json(&toggle)?;
        }
    }
    Ok(())
}
