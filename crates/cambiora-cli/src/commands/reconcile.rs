use chrono::Utc;
use clap::Args;

use super::{open_engine, print_json, CommandResult};

#[derive(Args)]
pub struct ReconcileArgs {
    /// Habit ID; every habit when omitted
    id: Option<String>,
}

pub fn run(args: ReconcileArgs) -> CommandResult {
    let (engine, config) = open_engine()?;
    let now = Utc::now();

    match args.id {
        Some(id) => print_json(&engine.reconcile(&config.user_id, &id, now)?)?,
        None => print_json(&engine.reconcile_all(&config.user_id, now)?)?,
    }
    Ok(())
}
