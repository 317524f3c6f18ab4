//! factiondraft CLI, the main entry point.
//!
//! Commands:
//! - `status`: Show config and database state
//! - `factions`: List the faction pool
//! - `player`: Register and list players
//! - `draft`: Start, inspect, pick and finalize a draft
//! - `game`: Record manual games, set winners, delete sessions
//! - `history`: Show finalized games

use clap::{Parser, Subcommand};
use factiondraft_config::{AppConfig, LogFormat};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "factiondraft",
    about = "factiondraft: history-aware faction drafting",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.factiondraft/config.toml)
    #[arg(long, global = true, env = "FACTIONDRAFT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show config and database state
    Status,

    /// List the faction pool
    Factions,

    /// Manage players
    Player {
        #[command(subcommand)]
        action: PlayerAction,
    },

    /// Run a draft
    Draft {
        #[command(subcommand)]
        action: DraftAction,
    },

    /// Manage recorded games
    Game {
        #[command(subcommand)]
        action: GameAction,
    },

    /// Show finalized games, newest first
    History {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PlayerAction {
    /// Register a player
    Add { name: String },
    /// List active players
    List,
}

#[derive(Subcommand)]
enum DraftAction {
    /// Draw offers for the given players
    Start {
        /// Player ids (at least three)
        #[arg(required = true, num_args = 1..)]
        players: Vec<i64>,
    },
    /// Show the active draft
    Show {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Record a participant's faction choice
    Pick { participant: i64, faction: i64 },
    /// Close the active draft
    Finalize,
}

#[derive(Subcommand)]
enum GameAction {
    /// Record a game played without a draft
    Manual {
        /// Game date as YYYY-MM-DD (defaults to now)
        #[arg(long)]
        date: Option<String>,

        /// A `player-id:faction-id` pair, repeated per seat
        #[arg(long = "pick", required = true)]
        picks: Vec<String>,
    },
    /// Delete a session and its participants
    Delete { session: i64 },
    /// Toggle the winner of a session
    Winner { session: i64, player: i64 },
}

fn init_tracing(config: &AppConfig, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load_with_env(&config_path)
        .map_err(|e| format!("Failed to load config: {e}"))?;

    init_tracing(&config, cli.verbose);

    match cli.command {
        Commands::Status => commands::status::run(&config, &config_path).await?,
        Commands::Factions => commands::player::factions(&config).await?,
        Commands::Player { action } => match action {
            PlayerAction::Add { name } => commands::player::add(&config, &name).await?,
            PlayerAction::List => commands::player::list(&config).await?,
        },
        Commands::Draft { action } => match action {
            DraftAction::Start { players } => commands::draft::start(&config, &players).await?,
            DraftAction::Show { json } => commands::draft::show(&config, json).await?,
            DraftAction::Pick {
                participant,
                faction,
            } => commands::draft::pick(&config, participant, faction).await?,
            DraftAction::Finalize => commands::draft::finalize(&config).await?,
        },
        Commands::Game { action } => match action {
            GameAction::Manual { date, picks } => {
                commands::game::manual(&config, date.as_deref(), &picks).await?
            }
            GameAction::Delete { session } => commands::game::delete(&config, session).await?,
            GameAction::Winner { session, player } => {
                commands::game::winner(&config, session, player).await?
            }
        },
        Commands::History { json } => commands::history::run(&config, json).await?,
    }

    Ok(())
}
