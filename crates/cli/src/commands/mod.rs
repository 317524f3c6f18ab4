pub mod draft;
pub mod game;
pub mod history;
pub mod player;
pub mod status;

use factiondraft_config::AppConfig;
use factiondraft_draft::{DraftManager, SessionView};
use factiondraft_store::SqliteStore;
use std::sync::Arc;

/// Open the configured database (running migrations) and seed the catalog.
pub async fn open_manager(config: &AppConfig) -> Result<DraftManager, Box<dyn std::error::Error>> {
    let store = SqliteStore::with_max_connections(
        &config.database.path,
        config.database.max_connections,
    )
    .await
    .map_err(|e| format!("Failed to open database at {}: {e}", config.database.path))?;

    let manager = DraftManager::new(Arc::new(store));
    manager.init().await?;
    Ok(manager)
}

/// Print one session as an indented table.
pub fn print_session(view: &SessionView) {
    let status = if view.session.active {
        "in progress"
    } else {
        "finalized"
    };
    println!(
        "🎲 Session #{}  {}  ({status})",
        view.session.id,
        view.session.started_at.format("%Y-%m-%d %H:%M")
    );
    for seat in &view.seats {
        let picked = seat
            .selected
            .as_ref()
            .map(|f| format!("{} [{}]", f.name, f.id))
            .unwrap_or_else(|| "-".into());
        let trophy = if view.winner.as_deref() == Some(seat.player.name.as_str()) {
            " 🏆"
        } else {
            ""
        };
        println!(
            "  [{:>3}] {:<16} picked: {picked}{trophy}",
            seat.participant, seat.player.name
        );
        if !seat.options.is_empty() {
            let options: Vec<String> = seat
                .options
                .iter()
                .map(|f| format!("{} [{}]", f.name, f.id))
                .collect();
            println!("        offered: {}", options.join(", "));
        }
    }
}
