use clap::Args;

use super::{open_engine, print_json, CommandResult};

#[derive(Args)]
pub struct ResetArgs {
    /// Confirm deleting every event, track and XP total
    #[arg(long)]
    yes: bool,
}

pub fn run(args: ResetArgs) -> CommandResult {
    if !args.yes {
        return Err("refusing to reset without --yes".into());
    }
    let (engine, config) = open_engine()?;
    let stats = engine.reset_all(&config.user_id)?;
    println!("progress reset");
    print_json(&stats)
}
