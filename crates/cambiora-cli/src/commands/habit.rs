//! Habit management commands for CLI.

use chrono::Utc;
use clap::Subcommand;
use serde::Serialize;

use super::{open_engine, print_json, CommandResult};

#[derive(Subcommand)]
pub enum HabitAction {
    /// Create a new habit
    Create {
        /// Habit name
        name: String,
        /// XP earned per logged day (default: progress.default_xp_per_day)
        #[arg(long)]
        xp: Option<u32>,
    },
    /// List habits with today's status
    List,
    /// Log a habit for today
    Log {
        /// Habit ID
        id: String,
    },
    /// Undo today's log
    Unlog {
        /// Habit ID
        id: String,
    },
    /// Delete a habit with all its history
    Delete {
        /// Habit ID
        id: String,
    },
    /// Resume a paused habit
    Activate {
        /// Habit ID
        id: String,
    },
    /// Pause a habit; paused habits cannot be logged
    Deactivate {
        /// Habit ID
        id: String,
    },
}

#[derive(Serialize)]
struct HabitRow {
    id: String,
    name: String,
    xp_per_day: u32,
    is_active: bool,
    streak: u32,
    logged_today: bool,
}

pub fn run(action: HabitAction) -> CommandResult {
    let (engine, config) = open_engine()?;
    let user = config.user_id.as_str();
    let now = Utc::now();

    match action {
        HabitAction::Create { name, xp } => {
            if name.trim().is_empty() {
                return Err("habit name must not be empty".into());
            }
            let (habit, reconciliation) = engine.create_habit(user, &name, xp, now)?;
            println!("Habit created: {}", habit.id);
            print_json(&serde_json::json!({
                "habit": habit,
                "track": reconciliation.track,
            }))?;
        }
        HabitAction::List => {
            let mut rows = Vec::new();
            for habit in engine.list_habits(user)? {
                rows.push(HabitRow {
                    streak: engine.subject_streak(user, &habit.id, now)?,
                    logged_today: engine.is_logged_today(user, &habit.id, now)?,
                    id: habit.id,
                    name: habit.name,
                    xp_per_day: habit.xp_per_day,
                    is_active: habit.is_active,
                });
            }
            print_json(&rows)?;
        }
        HabitAction::Log { id } => {
            let reconciliation = engine.log_habit(user, &id, now)?;
            print_json(&reconciliation)?;
        }
        HabitAction::Unlog { id } => {
            let reconciliation = engine.unlog_habit(user, &id, now)?;
            print_json(&reconciliation)?;
        }
        HabitAction::Delete { id } => {
            let stats = engine.delete_subject(user, &id, now)?;
            println!("Habit deleted: {id}");
            print_json(&stats)?;
        }
        HabitAction::Activate { id } => {
            engine.set_habit_active(user, &id, true)?;
            println!("Habit activated: {id}");
        }
        HabitAction::Deactivate { id } => {
            engine.set_habit_active(user, &id, false)?;
            println!("Habit deactivated: {id}");
        }
    }
    Ok(())
}
