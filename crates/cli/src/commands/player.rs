//! `factiondraft player` and `factiondraft factions`.

use super::open_manager;
use factiondraft_config::AppConfig;

pub async fn add(config: &AppConfig, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let manager = open_manager(config).await?;
    match manager.add_player(name).await? {
        Some(player) => println!("✅ Added player {} [{}]", player.name, player.id),
        None => println!("⚠️  A player named {:?} already exists", name.trim()),
    }
    Ok(())
}

pub async fn list(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let manager = open_manager(config).await?;
    let players = manager.players().await?;

    println!("👥 Players");
    println!("==========");
    if players.is_empty() {
        println!("  No players yet. Add one with `factiondraft player add <name>`.");
    }
    for player in players {
        println!("  [{:>3}] {}", player.id, player.name);
    }
    Ok(())
}

pub async fn factions(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let manager = open_manager(config).await?;
    let factions = manager.factions().await?;

    println!("🌌 Factions ({})", factions.len());
    println!("============");
    for faction in factions {
        println!("  [{:>3}] {}", faction.id, faction.name);
    }
    Ok(())
}
