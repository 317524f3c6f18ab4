//! `factiondraft draft`: start, show, pick and finalize.

use super::{open_manager, print_session};
use factiondraft_config::AppConfig;
use factiondraft_core::{FactionId, FinalizeOutcome, ParticipantId, PlayerId};
use factiondraft_draft::BanTier;

pub async fn start(config: &AppConfig, players: &[i64]) -> Result<(), Box<dyn std::error::Error>> {
    let manager = open_manager(config).await?;
    let ids: Vec<PlayerId> = players.iter().copied().map(PlayerId).collect();
    let outcome = manager.start_draft(&ids).await?;

    println!("🎲 Draft started: session #{}", outcome.session);
    println!();
    for seat in &outcome.players {
        let marker = match seat.tier {
            BanTier::Strict => "",
            BanTier::Exhausted => "  ❗ shares factions with another player",
            _ => "  ⚠️  relaxed bans",
        };
        println!("  [{:>3}] {}{marker}", seat.participant, seat.player.name);
        for faction in &seat.options {
            println!("        {:>3}  {}", faction.id, faction.name);
        }
    }

    if outcome.report.degraded() > 0 {
        println!();
        println!(
            "⚠️  {} player(s) needed relaxed bans, {} received contested factions",
            outcome.report.degraded(),
            outcome.report.critical()
        );
    }
    println!();
    println!("Record choices with `factiondraft draft pick <participant> <faction>`.");
    Ok(())
}

pub async fn show(config: &AppConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let manager = open_manager(config).await?;
    let Some(view) = manager.current_draft().await? else {
        if json {
            println!("null");
        } else {
            println!("No draft in progress. Start one with `factiondraft draft start`.");
        }
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_session(&view);
    }
    Ok(())
}

pub async fn pick(
    config: &AppConfig,
    participant: i64,
    faction: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = open_manager(config).await?;
    let chosen = manager
        .select_faction(ParticipantId(participant), FactionId(faction))
        .await?;
    println!("✅ Participant {participant} plays {}", chosen.name);
    Ok(())
}

pub async fn finalize(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let manager = open_manager(config).await?;
    match manager.finalize().await? {
        FinalizeOutcome::Finalized {
            session,
            kept,
            pruned,
        } => {
            println!("✅ Session #{session} finalized with {kept} player(s)");
            if pruned > 0 {
                println!("   Removed {pruned} player(s) who did not pick");
            }
        }
        FinalizeOutcome::Discarded { session, .. } => {
            println!("⚠️  Nobody picked a faction, session #{session} was discarded");
        }
    }
    Ok(())
}
