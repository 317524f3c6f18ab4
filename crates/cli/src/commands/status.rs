//! `factiondraft status`: Show config and database state.

use super::open_manager;
use factiondraft_config::AppConfig;
use std::path::Path;

fn config_file_line(path: &Path) -> String {
    if path.exists() {
        format!("  ✅ Config file found at {}", path.display())
    } else {
        format!("  ⚠️  No config file at {}, using defaults", path.display())
    }
}

pub async fn run(
    config: &AppConfig,
    config_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = open_manager(config).await?;

    let factions = manager.factions().await?;
    let players = manager.players().await?;
    let games = manager.history().await?;

    println!("🎲 factiondraft Status");
    println!("======================");
    println!("  Config file:  {}", config_path.display());
    println!("  Database:     {} ({})", config.database.path, manager.store().name());
    println!("  Log level:    {}", config.logging.level);
    println!("  Factions:     {}", factions.len());
    println!("  Players:      {}", players.len());
    println!("  Games played: {}", games.len());

    match manager.current_draft().await? {
        Some(draft) => println!(
            "  Draft:        session #{} in progress ({} seats)",
            draft.session.id,
            draft.seats.len()
        ),
        None => println!("  Draft:        none active"),
    }

    println!("\n{}", config_file_line(config_path));

    Ok(())
}
