use clap::{Parser, Subcommand};
use cambiora_core::ProgressError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "cambiora-cli", version, about = "Cambiora habit tracker CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Habit management and daily logging
    Habit {
        #[command(subcommand)]
        action: commands::habit::HabitAction,
    },
    /// Daily challenges
    Challenge {
        #[command(subcommand)]
        action: commands::challenge::ChallengeAction,
    },
    /// XP and streak statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Milestone tracks and trophies
    Track {
        #[command(subcommand)]
        action: commands::track::TrackAction,
    },
    /// Recompute derived progress from the activity log
    Reconcile(commands::reconcile::ReconcileArgs),
    /// Delete all activity and progress (habits are kept)
    Reset(commands::reset::ResetArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("CAMBIORA_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Habit { action } => commands::habit::run(action),
        Commands::Challenge { action } => commands::challenge::run(action),
        Commands::Stats { action } => commands::stats::run(action),
        Commands::Track { action } => commands::track::run(action),
        Commands::Reconcile(args) => commands::reconcile::run(args),
        Commands::Reset(args) => commands::reset::run(args),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        match e.downcast_ref::<ProgressError>() {
            Some(progress) => eprintln!("error: {}", progress.user_message()),
            None => eprintln!("error: {e}"),
        }
        std::process::exit(1);
    }
}
