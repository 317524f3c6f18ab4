//! `factiondraft history`: finalized games, newest first.

use super::{open_manager, print_session};
use factiondraft_config::AppConfig;

pub async fn run(config: &AppConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let manager = open_manager(config).await?;
    let games = manager.history().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&games)?);
        return Ok(());
    }

    println!("📜 History ({} games)", games.len());
    println!("============");
    if games.is_empty() {
        println!("  No finalized games yet.");
    }
    for game in &games {
        println!();
        print_session(game);
    }
    Ok(())
}
