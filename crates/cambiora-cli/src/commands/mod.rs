pub mod challenge;
pub mod config;
pub mod habit;
pub mod reconcile;
pub mod reset;
pub mod stats;
pub mod track;

use cambiora_core::{Config, Database, ProgressEngine};

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Load config and open the database-backed engine for the configured user.
pub fn open_engine() -> Result<(ProgressEngine<Database>, Config), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let engine = ProgressEngine::new(Database::open()?, config.engine_settings()?);
    Ok((engine, config))
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
