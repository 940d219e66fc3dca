mod config;
pub mod database;
pub mod migrations;

pub use config::{CalendarConfig, Config, ProgressConfig};
pub use database::Database;

use std::path::PathBuf;

use crate::error::Result;

/// Returns the data directory, creating it if needed.
///
/// `CAMBIORA_DATA_DIR` wins when set. Otherwise `~/.config/cambiora[-dev]/`
/// based on `CAMBIORA_ENV`; set `CAMBIORA_ENV=dev` for a development copy.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("CAMBIORA_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("CAMBIORA_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("cambiora-dev")
            } else {
                base_dir.join("cambiora")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
