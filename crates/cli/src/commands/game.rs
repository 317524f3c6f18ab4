//! `factiondraft game`: manual games, winners and deletion.

use super::open_manager;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use factiondraft_config::AppConfig;
use factiondraft_core::{FactionId, PlayerId, SessionId};

/// Parse `player-id:faction-id`.
fn parse_pick(raw: &str) -> Result<(PlayerId, FactionId), String> {
    let (player, faction) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected <player-id>:<faction-id>, got {raw:?}"))?;
    let player = player
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("bad player id in {raw:?}: {e}"))?;
    let faction = faction
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("bad faction id in {raw:?}: {e}"))?;
    Ok((PlayerId(player), FactionId(faction)))
}

/// Midnight UTC of a `YYYY-MM-DD` date.
fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| format!("bad date {raw:?}, expected YYYY-MM-DD: {e}"))?;
    Ok(date.and_time(NaiveTime::MIN).and_utc())
}

pub async fn manual(
    config: &AppConfig,
    date: Option<&str>,
    picks: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let date = date.map(parse_date).transpose()?;
    let pairs = picks
        .iter()
        .map(|raw| parse_pick(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let manager = open_manager(config).await?;
    let record = manager.record_manual_session(date, &pairs).await?;
    println!(
        "✅ Recorded game #{} on {} with {} player(s)",
        record.id(),
        record.session.started_at.format("%Y-%m-%d"),
        record.participants.len()
    );
    Ok(())
}

pub async fn delete(config: &AppConfig, session: i64) -> Result<(), Box<dyn std::error::Error>> {
    let manager = open_manager(config).await?;
    if manager.delete_session(SessionId(session)).await? {
        println!("🗑️  Deleted session #{session}");
    } else {
        println!("⚠️  No session #{session}");
    }
    Ok(())
}

pub async fn winner(
    config: &AppConfig,
    session: i64,
    player: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = open_manager(config).await?;
    match manager
        .set_winner(SessionId(session), PlayerId(player))
        .await?
    {
        Some(winner) => println!("🏆 Player {winner} won session #{session}"),
        None => println!("✅ Cleared the winner of session #{session}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn pick_pairs_parse() {
        assert_eq!(parse_pick("3:17").unwrap(), (PlayerId(3), FactionId(17)));
        assert_eq!(parse_pick(" 4 : 2 ").unwrap(), (PlayerId(4), FactionId(2)));
    }

    #[test]
    fn malformed_picks_rejected() {
        assert!(parse_pick("3").is_err());
        assert!(parse_pick("x:1").is_err());
        assert!(parse_pick("1:").is_err());
    }

    #[test]
    fn dates_are_midnight_utc() {
        let date = parse_date("2024-03-09").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2024, 3, 9));
        assert_eq!(date.timestamp() % 86_400, 0);
        assert!(parse_date("09/03/2024").is_err());
    }
}
