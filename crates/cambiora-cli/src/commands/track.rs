use clap::Subcommand;

use super::{open_engine, print_json, CommandResult};

#[derive(Subcommand)]
pub enum TrackAction {
    /// Active milestone track of a habit
    Show {
        /// Habit ID
        id: String,
    },
    /// Completed milestones, newest first
    Trophies,
    /// The milestone catalog with earned/active/locked status
    Catalog,
}

pub fn run(action: TrackAction) -> CommandResult {
    let (engine, config) = open_engine()?;
    let user = config.user_id.as_str();

    match action {
        TrackAction::Show { id } => print_json(&engine.current_track(user, &id)?)?,
        TrackAction::Trophies => print_json(&engine.trophies(user)?)?,
        TrackAction::Catalog => print_json(&engine.catalog_view(user)?)?,
    }
    Ok(())
}
