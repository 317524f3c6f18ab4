//! SQLite backend with versioned schema migrations.
//!
//! Uses a single SQLite database file with five tables:
//! - `factions`: the catalog, unique by name
//! - `players`: registered players, unique by name
//! - `sessions`: one row per game, newest by `started_at`
//! - `participants`: one seat per player and session
//! - `participant_offers`: the ordered offer list of each drafted seat
//!
//! The schema version lives in `PRAGMA user_version`; every migration step
//! runs in its own transaction.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use factiondraft_core::error::StoreError;
use factiondraft_core::model::{
    Faction, FactionId, Participant, ParticipantId, Player, PlayerId, Session, SessionId,
    SessionRecord,
};
use factiondraft_core::store::{DraftStore, FinalizeOutcome, HistoryEntry, HistoryKind, NewDraft};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Ordered schema migrations. Index `i` upgrades the schema to version `i + 1`.
const MIGRATIONS: &[&[&str]] = &[&[
    r#"
    CREATE TABLE IF NOT EXISTS factions (
        id    INTEGER PRIMARY KEY AUTOINCREMENT,
        name  TEXT UNIQUE NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS players (
        id      INTEGER PRIMARY KEY AUTOINCREMENT,
        name    TEXT UNIQUE NOT NULL,
        active  INTEGER NOT NULL DEFAULT 1
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        started_at  TEXT NOT NULL,
        active      INTEGER NOT NULL DEFAULT 1,
        winner_id   INTEGER REFERENCES players(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS participants (
        id                   INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id           INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        player_id            INTEGER NOT NULL REFERENCES players(id),
        selected_faction_id  INTEGER REFERENCES factions(id),
        drafted              INTEGER NOT NULL DEFAULT 0,
        UNIQUE (session_id, player_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS participant_offers (
        participant_id  INTEGER NOT NULL REFERENCES participants(id) ON DELETE CASCADE,
        position        INTEGER NOT NULL,
        faction_id      INTEGER NOT NULL REFERENCES factions(id),
        PRIMARY KEY (participant_id, position)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_sessions_started_at ON sessions(started_at DESC, id DESC)",
    "CREATE INDEX IF NOT EXISTS idx_participants_player ON participants(player_id)",
]];

const SESSION_COLUMNS: &str = "SELECT id, started_at, active, winner_id FROM sessions";
const SESSION_ORDER: &str = "ORDER BY started_at DESC, id DESC";

fn query_failed(context: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |e| StoreError::QueryFailed(format!("{context}: {e}"))
}

fn storage_failed(context: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |e| StoreError::Storage(format!("{context}: {e}"))
}

/// Fixed-width UTC timestamps so that lexical order matches time order.
fn encode_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("invalid timestamp {raw:?}: {e}")))
}

/// A production SQLite draft store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and migrate it.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        Self::with_max_connections(path, 4).await
    }

    pub async fn with_max_connections(path: &str, max_connections: u32) -> Result<Self, StoreError> {
        let in_memory = path.contains(":memory:");
        let base = if path.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(path)
                .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
        } else {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::Storage(format!("Failed to create {}: {e}", parent.display()))
                    })?;
                }
            }
            SqliteConnectOptions::new().filename(path)
        };
        let options = base
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        // Every connection to `:memory:` is its own database, so keep exactly one alive.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(Option::<Duration>::None)
                .max_lifetime(Option::<Duration>::None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!(path, "SQLite draft store initialized");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Current schema version.
    pub async fn schema_version(&self) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("read user_version: {e}")))
    }

    /// Apply every migration newer than the stored schema version.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        let current = self.schema_version().await?;

        for (index, statements) in MIGRATIONS.iter().enumerate() {
            let version = index as i64 + 1;
            if version <= current {
                continue;
            }

            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("begin v{version}: {e}")))?;
            for statement in statements.iter() {
                sqlx::query(statement)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StoreError::MigrationFailed(format!("v{version}: {e}")))?;
            }
            // PRAGMA does not accept bind parameters.
            sqlx::query(&format!("PRAGMA user_version = {version}"))
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("set user_version: {e}")))?;
            tx.commit()
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("commit v{version}: {e}")))?;

            info!(version, "Applied schema migration");
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_faction(row: &SqliteRow) -> Result<Faction, StoreError> {
        Ok(Faction {
            id: FactionId(row.try_get("id").map_err(query_failed("faction id"))?),
            name: row.try_get("name").map_err(query_failed("faction name"))?,
        })
    }

    fn row_to_player(row: &SqliteRow) -> Result<Player, StoreError> {
        Ok(Player {
            id: PlayerId(row.try_get("id").map_err(query_failed("player id"))?),
            name: row.try_get("name").map_err(query_failed("player name"))?,
            active: row.try_get("active").map_err(query_failed("player active"))?,
        })
    }

    fn row_to_session(row: &SqliteRow) -> Result<Session, StoreError> {
        let started_at: String = row
            .try_get("started_at")
            .map_err(query_failed("started_at column"))?;
        let winner: Option<i64> = row
            .try_get("winner_id")
            .map_err(query_failed("winner_id column"))?;

        Ok(Session {
            id: SessionId(row.try_get("id").map_err(query_failed("session id"))?),
            started_at: decode_time(&started_at)?,
            active: row.try_get("active").map_err(query_failed("active column"))?,
            winner: winner.map(PlayerId),
        })
    }

    /// Sessions matching a static SQL filter, newest first.
    async fn fetch_sessions(&self, filter: &str, limit: Option<i64>) -> Result<Vec<Session>, StoreError> {
        let limit = limit.map(|n| format!("LIMIT {n}")).unwrap_or_default();
        let sql = format!("{SESSION_COLUMNS} {filter} {SESSION_ORDER} {limit}");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("sessions"))?;
        rows.iter().map(Self::row_to_session).collect()
    }

    async fn offers_for(&self, participant: i64) -> Result<Vec<FactionId>, StoreError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT faction_id FROM participant_offers WHERE participant_id = ?1 ORDER BY position",
        )
        .bind(participant)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("offers"))?;
        Ok(ids.into_iter().map(FactionId).collect())
    }

    async fn participants_of(&self, session: SessionId) -> Result<Vec<Participant>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, player_id, selected_faction_id, drafted
            FROM participants
            WHERE session_id = ?1
            ORDER BY id
            "#,
        )
        .bind(session.0)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("participants"))?;

        let offer_rows = sqlx::query(
            r#"
            SELECT o.participant_id, o.faction_id
            FROM participant_offers o
            JOIN participants p ON p.id = o.participant_id
            WHERE p.session_id = ?1
            ORDER BY o.participant_id, o.position
            "#,
        )
        .bind(session.0)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("session offers"))?;

        let mut offers: HashMap<i64, Vec<FactionId>> = HashMap::new();
        for row in &offer_rows {
            let participant: i64 = row
                .try_get("participant_id")
                .map_err(query_failed("participant_id column"))?;
            let faction: i64 = row
                .try_get("faction_id")
                .map_err(query_failed("faction_id column"))?;
            offers.entry(participant).or_default().push(FactionId(faction));
        }

        rows.iter()
            .map(|row| -> Result<Participant, StoreError> {
                let id: i64 = row.try_get("id").map_err(query_failed("participant id"))?;
                let drafted: bool = row.try_get("drafted").map_err(query_failed("drafted column"))?;
                let selected: Option<i64> = row
                    .try_get("selected_faction_id")
                    .map_err(query_failed("selected_faction_id column"))?;
                Ok(Participant {
                    id: ParticipantId(id),
                    session_id: SessionId(
                        row.try_get("session_id").map_err(query_failed("session_id column"))?,
                    ),
                    player_id: PlayerId(
                        row.try_get("player_id").map_err(query_failed("player_id column"))?,
                    ),
                    offered: drafted.then(|| offers.remove(&id).unwrap_or_default()),
                    selected: selected.map(FactionId),
                })
            })
            .collect()
    }

    async fn with_participants(&self, sessions: Vec<Session>) -> Result<Vec<SessionRecord>, StoreError> {
        let mut records = Vec::with_capacity(sessions.len());
        for session in sessions {
            let participants = self.participants_of(session.id).await?;
            records.push(SessionRecord {
                session,
                participants,
            });
        }
        Ok(records)
    }

    async fn first_record(&self, filter: &str) -> Result<Option<SessionRecord>, StoreError> {
        let sessions = self.fetch_sessions(filter, Some(1)).await?;
        Ok(self.with_participants(sessions).await?.into_iter().next())
    }

    async fn require_session(&self, id: SessionId) -> Result<SessionRecord, StoreError> {
        self.session(id)
            .await?
            .ok_or_else(|| StoreError::QueryFailed(format!("session {id} vanished after write")))
    }
}

#[async_trait]
impl DraftStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn seed_factions(&self, names: &[&str]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await.map_err(storage_failed("begin seed"))?;
        let mut added = 0;
        for name in names {
            let result = sqlx::query("INSERT INTO factions (name) VALUES (?1) ON CONFLICT(name) DO NOTHING")
                .bind(*name)
                .execute(&mut *tx)
                .await
                .map_err(storage_failed("seed faction"))?;
            if result.rows_affected() > 0 {
                debug!(faction = *name, "Inserted faction");
                added += 1;
            }
        }
        tx.commit().await.map_err(storage_failed("commit seed"))?;
        Ok(added)
    }

    async fn factions(&self) -> Result<Vec<Faction>, StoreError> {
        let rows = sqlx::query("SELECT id, name FROM factions ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("factions"))?;
        rows.iter().map(Self::row_to_faction).collect()
    }

    async fn faction(&self, id: FactionId) -> Result<Option<Faction>, StoreError> {
        let row = sqlx::query("SELECT id, name FROM factions WHERE id = ?1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("faction"))?;
        row.as_ref().map(Self::row_to_faction).transpose()
    }

    async fn add_player(&self, name: &str) -> Result<Option<Player>, StoreError> {
        let result = sqlx::query("INSERT INTO players (name, active) VALUES (?1, 1) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(storage_failed("INSERT player"))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Ok(Some(Player {
            id: PlayerId(result.last_insert_rowid()),
            name: name.to_string(),
            active: true,
        }))
    }

    async fn player(&self, id: PlayerId) -> Result<Option<Player>, StoreError> {
        let row = sqlx::query("SELECT id, name, active FROM players WHERE id = ?1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("player"))?;
        row.as_ref().map(Self::row_to_player).transpose()
    }

    async fn active_players(&self) -> Result<Vec<Player>, StoreError> {
        let rows = sqlx::query("SELECT id, name, active FROM players WHERE active = 1 ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("players"))?;
        rows.iter().map(Self::row_to_player).collect()
    }

    async fn recent_history(
        &self,
        player: PlayerId,
        kind: HistoryKind,
        limit: usize,
        finalized_only: bool,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT p.id AS participant_id, p.selected_faction_id, p.drafted,
                   s.id AS session_id, s.started_at, s.active
            FROM participants p
            JOIN sessions s ON s.id = p.session_id
            WHERE p.player_id = ?1 AND (?2 = 0 OR s.active = 0)
            ORDER BY s.started_at DESC, s.id DESC
            LIMIT ?3
            "#,
        )
        .bind(player.0)
        .bind(finalized_only)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("history"))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let started_at: String = row
                .try_get("started_at")
                .map_err(query_failed("started_at column"))?;
            let active: bool = row.try_get("active").map_err(query_failed("active column"))?;

            let faction_ids = match kind {
                HistoryKind::Played => {
                    let selected: Option<i64> = row
                        .try_get("selected_faction_id")
                        .map_err(query_failed("selected_faction_id column"))?;
                    selected.map(FactionId).into_iter().collect()
                }
                HistoryKind::Drafted => {
                    let drafted: bool =
                        row.try_get("drafted").map_err(query_failed("drafted column"))?;
                    if drafted {
                        let participant: i64 = row
                            .try_get("participant_id")
                            .map_err(query_failed("participant_id column"))?;
                        self.offers_for(participant).await?
                    } else {
                        Vec::new()
                    }
                }
            };

            entries.push(HistoryEntry {
                session_id: SessionId(
                    row.try_get("session_id").map_err(query_failed("session_id column"))?,
                ),
                started_at: decode_time(&started_at)?,
                finalized: !active,
                faction_ids,
            });
        }
        Ok(entries)
    }

    async fn last_finalized_session(&self) -> Result<Option<SessionRecord>, StoreError> {
        self.first_record("WHERE active = 0").await
    }

    async fn active_session(&self) -> Result<Option<SessionRecord>, StoreError> {
        self.first_record("WHERE active = 1").await
    }

    async fn session(&self, id: SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let row = sqlx::query(&format!("{SESSION_COLUMNS} WHERE id = ?1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("session"))?;
        match row {
            Some(row) => {
                let session = Self::row_to_session(&row)?;
                let participants = self.participants_of(session.id).await?;
                Ok(Some(SessionRecord {
                    session,
                    participants,
                }))
            }
            None => Ok(None),
        }
    }

    async fn sessions(&self, finalized_only: bool) -> Result<Vec<SessionRecord>, StoreError> {
        let filter = if finalized_only { "WHERE active = 0" } else { "" };
        let sessions = self.fetch_sessions(filter, None).await?;
        self.with_participants(sessions).await
    }

    async fn persist_draft(&self, draft: NewDraft) -> Result<SessionRecord, StoreError> {
        let mut tx = self.pool.begin().await.map_err(storage_failed("begin draft"))?;

        let active: Option<i64> = sqlx::query_scalar("SELECT id FROM sessions WHERE active = 1 LIMIT 1")
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_failed("active session"))?;
        if let Some(id) = active {
            // Dropping `tx` rolls back.
            return Err(StoreError::Conflict(format!("session {id} is still active")));
        }

        let session_id = sqlx::query("INSERT INTO sessions (started_at, active) VALUES (?1, 1)")
            .bind(encode_time(&draft.started_at))
            .execute(&mut *tx)
            .await
            .map_err(storage_failed("INSERT session"))?
            .last_insert_rowid();

        for (player, offers) in &draft.entries {
            let participant_id = sqlx::query(
                "INSERT INTO participants (session_id, player_id, drafted) VALUES (?1, ?2, 1)",
            )
            .bind(session_id)
            .bind(player.0)
            .execute(&mut *tx)
            .await
            .map_err(storage_failed("INSERT participant"))?
            .last_insert_rowid();

            for (position, faction) in offers.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO participant_offers (participant_id, position, faction_id) VALUES (?1, ?2, ?3)",
                )
                .bind(participant_id)
                .bind(position as i64)
                .bind(faction.0)
                .execute(&mut *tx)
                .await
                .map_err(storage_failed("INSERT offer"))?;
            }
        }

        tx.commit().await.map_err(storage_failed("commit draft"))?;
        debug!(session = session_id, seats = draft.entries.len(), "Persisted draft");
        self.require_session(SessionId(session_id)).await
    }

    async fn create_manual_session(
        &self,
        started_at: DateTime<Utc>,
        picks: &[(PlayerId, FactionId)],
    ) -> Result<SessionRecord, StoreError> {
        let mut tx = self.pool.begin().await.map_err(storage_failed("begin manual"))?;

        let session_id = sqlx::query("INSERT INTO sessions (started_at, active) VALUES (?1, 0)")
            .bind(encode_time(&started_at))
            .execute(&mut *tx)
            .await
            .map_err(storage_failed("INSERT session"))?
            .last_insert_rowid();

        for (player, faction) in picks {
            sqlx::query(
                "INSERT INTO participants (session_id, player_id, selected_faction_id, drafted) VALUES (?1, ?2, ?3, 0)",
            )
            .bind(session_id)
            .bind(player.0)
            .bind(faction.0)
            .execute(&mut *tx)
            .await
            .map_err(storage_failed("INSERT participant"))?;
        }

        tx.commit().await.map_err(storage_failed("commit manual"))?;
        self.require_session(SessionId(session_id)).await
    }

    async fn participant(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError> {
        let row = sqlx::query(
            "SELECT id, session_id, player_id, selected_faction_id, drafted FROM participants WHERE id = ?1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed("participant"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let drafted: bool = row.try_get("drafted").map_err(query_failed("drafted column"))?;
        let selected: Option<i64> = row
            .try_get("selected_faction_id")
            .map_err(query_failed("selected_faction_id column"))?;
        let offered = if drafted {
            Some(self.offers_for(id.0).await?)
        } else {
            None
        };

        Ok(Some(Participant {
            id,
            session_id: SessionId(row.try_get("session_id").map_err(query_failed("session_id column"))?),
            player_id: PlayerId(row.try_get("player_id").map_err(query_failed("player_id column"))?),
            offered,
            selected: selected.map(FactionId),
        }))
    }

    async fn set_selection(
        &self,
        participant: ParticipantId,
        faction: FactionId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE participants SET selected_faction_id = ?1 WHERE id = ?2")
            .bind(faction.0)
            .bind(participant.0)
            .execute(&self.pool)
            .await
            .map_err(storage_failed("UPDATE selection"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_winner(
        &self,
        session: SessionId,
        winner: Option<PlayerId>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE sessions SET winner_id = ?1 WHERE id = ?2")
            .bind(winner.map(|p| p.0))
            .bind(session.0)
            .execute(&self.pool)
            .await
            .map_err(storage_failed("UPDATE winner"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn finalize_session(
        &self,
        session: SessionId,
    ) -> Result<Option<FinalizeOutcome>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(storage_failed("begin finalize"))?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM sessions WHERE id = ?1")
            .bind(session.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_failed("session"))?;
        if exists.is_none() {
            return Ok(None);
        }

        sqlx::query(
            r#"
            DELETE FROM participant_offers WHERE participant_id IN (
                SELECT id FROM participants WHERE session_id = ?1 AND selected_faction_id IS NULL
            )
            "#,
        )
        .bind(session.0)
        .execute(&mut *tx)
        .await
        .map_err(storage_failed("DELETE pruned offers"))?;

        let pruned = sqlx::query("DELETE FROM participants WHERE session_id = ?1 AND selected_faction_id IS NULL")
            .bind(session.0)
            .execute(&mut *tx)
            .await
            .map_err(storage_failed("DELETE pruned participants"))?
            .rows_affected() as usize;

        let kept: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM participants WHERE session_id = ?1")
            .bind(session.0)
            .fetch_one(&mut *tx)
            .await
            .map_err(query_failed("kept participants"))?;

        let outcome = if kept == 0 {
            sqlx::query("DELETE FROM sessions WHERE id = ?1")
                .bind(session.0)
                .execute(&mut *tx)
                .await
                .map_err(storage_failed("DELETE session"))?;
            FinalizeOutcome::Discarded { session, pruned }
        } else {
            sqlx::query(
                r#"
                UPDATE sessions
                SET active = 0,
                    winner_id = CASE
                        WHEN winner_id IN (SELECT player_id FROM participants WHERE session_id = ?1)
                        THEN winner_id
                        ELSE NULL
                    END
                WHERE id = ?1
                "#,
            )
            .bind(session.0)
            .execute(&mut *tx)
            .await
            .map_err(storage_failed("UPDATE session"))?;
            FinalizeOutcome::Finalized {
                session,
                kept: kept as usize,
                pruned,
            }
        };

        tx.commit().await.map_err(storage_failed("commit finalize"))?;
        Ok(Some(outcome))
    }

    async fn delete_session(&self, session: SessionId) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(storage_failed("begin delete"))?;

        sqlx::query(
            "DELETE FROM participant_offers WHERE participant_id IN (SELECT id FROM participants WHERE session_id = ?1)",
        )
        .bind(session.0)
        .execute(&mut *tx)
        .await
        .map_err(storage_failed("DELETE offers"))?;

        sqlx::query("DELETE FROM participants WHERE session_id = ?1")
            .bind(session.0)
            .execute(&mut *tx)
            .await
            .map_err(storage_failed("DELETE participants"))?;

        let deleted = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(session.0)
            .execute(&mut *tx)
            .await
            .map_err(storage_failed("DELETE session"))?
            .rows_affected()
            > 0;

        tx.commit().await.map_err(storage_failed("commit delete"))?;
        if deleted {
            debug!(session = session.0, "Deleted session");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use factiondraft_core::FACTIONS;

    async fn test_store() -> SqliteStore {
        let store = SqliteStore::new("sqlite::memory:").await.unwrap();
        store.seed_factions(FACTIONS).await.unwrap();
        store
    }

    async fn players(store: &SqliteStore, names: &[&str]) -> Vec<PlayerId> {
        let mut ids = Vec::new();
        for name in names {
            ids.push(store.add_player(name).await.unwrap().unwrap().id);
        }
        ids
    }

    fn draft(at: DateTime<Utc>, entries: Vec<(PlayerId, Vec<i64>)>) -> NewDraft {
        NewDraft {
            started_at: at,
            entries: entries
                .into_iter()
                .map(|(p, ids)| (p, ids.into_iter().map(FactionId).collect()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn migrations_set_schema_version() {
        let store = test_store().await;
        assert_eq!(store.schema_version().await.unwrap(), MIGRATIONS.len() as i64);
        // Re-running is a no-op.
        store.run_migrations().await.unwrap();
        assert_eq!(store.schema_version().await.unwrap(), MIGRATIONS.len() as i64);
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let store = test_store().await;
        assert_eq!(store.factions().await.unwrap().len(), FACTIONS.len());

        let added = store.seed_factions(FACTIONS).await.unwrap();
        assert_eq!(added, 0);
        assert_eq!(store.factions().await.unwrap().len(), FACTIONS.len());

        let added = store.seed_factions(&["The Arborec", "A Homebrew Faction"]).await.unwrap();
        assert_eq!(added, 1);
        assert_eq!(store.factions().await.unwrap().len(), FACTIONS.len() + 1);
    }

    #[tokio::test]
    async fn duplicate_player_rejected() {
        let store = test_store().await;
        assert!(store.add_player("Anna").await.unwrap().is_some());
        assert!(store.add_player("Anna").await.unwrap().is_none());
        assert_eq!(store.active_players().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn draft_round_trip_keeps_offer_order() {
        let store = test_store().await;
        let ids = players(&store, &["Anna", "Bela", "Csaba"]).await;

        let record = store
            .persist_draft(draft(
                Utc::now(),
                vec![(ids[0], vec![7, 2, 5]), (ids[1], vec![1, 9, 3]), (ids[2], vec![4, 8, 6])],
            ))
            .await
            .unwrap();

        assert!(record.session.active);
        assert_eq!(record.participants.len(), 3);
        let anna = record.participant_for(ids[0]).unwrap();
        assert_eq!(
            anna.offered.as_deref(),
            Some(&[FactionId(7), FactionId(2), FactionId(5)][..])
        );
        assert!(anna.selected.is_none());

        let fetched = store.participant(anna.id).await.unwrap().unwrap();
        assert_eq!(fetched.offered, anna.offered);
    }

    #[tokio::test]
    async fn second_active_session_conflicts() {
        let store = test_store().await;
        let ids = players(&store, &["Anna", "Bela", "Csaba"]).await;
        store
            .persist_draft(draft(Utc::now(), vec![(ids[0], vec![1, 2, 3])]))
            .await
            .unwrap();

        let err = store
            .persist_draft(draft(Utc::now(), vec![(ids[1], vec![4, 5, 6])]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.sessions(false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn active_session_found_behind_newer_finalized_game() {
        let store = test_store().await;
        let ids = players(&store, &["Anna", "Bela", "Csaba"]).await;
        let open = store
            .persist_draft(draft(Utc::now() - Duration::hours(1), vec![(ids[0], vec![1, 2, 3])]))
            .await
            .unwrap();
        store
            .create_manual_session(Utc::now(), &[(ids[1], FactionId(4))])
            .await
            .unwrap();

        let active = store.active_session().await.unwrap().unwrap();
        assert_eq!(active.id(), open.id());
        assert!(active.session.active);
    }

    #[tokio::test]
    async fn failed_draft_rolls_back() {
        let store = test_store().await;
        let ids = players(&store, &["Anna"]).await;

        // Unknown player violates the foreign key on the second seat.
        let result = store
            .persist_draft(draft(
                Utc::now(),
                vec![(ids[0], vec![1, 2, 3]), (PlayerId(999), vec![4, 5, 6])],
            ))
            .await;
        assert!(result.is_err());
        assert!(store.sessions(false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn finalize_prunes_and_closes() {
        let store = test_store().await;
        let ids = players(&store, &["Anna", "Bela", "Csaba"]).await;
        let record = store
            .persist_draft(draft(
                Utc::now(),
                vec![(ids[0], vec![1, 2, 3]), (ids[1], vec![4, 5, 6]), (ids[2], vec![7, 8, 9])],
            ))
            .await
            .unwrap();

        let anna = record.participant_for(ids[0]).unwrap().id;
        let bela = record.participant_for(ids[1]).unwrap().id;
        assert!(store.set_selection(anna, FactionId(2)).await.unwrap());
        assert!(store.set_selection(bela, FactionId(4)).await.unwrap());

        let outcome = store.finalize_session(record.id()).await.unwrap().unwrap();
        assert_eq!(
            outcome,
            FinalizeOutcome::Finalized {
                session: record.id(),
                kept: 2,
                pruned: 1
            }
        );

        let closed = store.last_finalized_session().await.unwrap().unwrap();
        assert!(!closed.session.active);
        assert_eq!(closed.participants.len(), 2);
        let mut picked: Vec<_> = closed.selected_factions().collect();
        picked.sort();
        assert_eq!(picked, vec![FactionId(2), FactionId(4)]);
    }

    #[tokio::test]
    async fn finalize_without_picks_discards() {
        let store = test_store().await;
        let ids = players(&store, &["Anna", "Bela", "Csaba"]).await;
        let record = store
            .persist_draft(draft(Utc::now(), vec![(ids[0], vec![1, 2, 3]), (ids[1], vec![4, 5, 6])]))
            .await
            .unwrap();

        let outcome = store.finalize_session(record.id()).await.unwrap().unwrap();
        assert_eq!(
            outcome,
            FinalizeOutcome::Discarded {
                session: record.id(),
                pruned: 2
            }
        );
        assert!(store.session(record.id()).await.unwrap().is_none());
        assert!(store.finalize_session(record.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn history_orders_newest_first_and_filters_finalized() {
        let store = test_store().await;
        let ids = players(&store, &["Anna", "Bela", "Csaba"]).await;
        let base = Utc::now() - Duration::days(10);

        store
            .create_manual_session(base, &[(ids[0], FactionId(1)), (ids[1], FactionId(2))])
            .await
            .unwrap();
        store
            .create_manual_session(base + Duration::days(1), &[(ids[0], FactionId(3))])
            .await
            .unwrap();
        store
            .persist_draft(draft(base + Duration::days(2), vec![(ids[0], vec![10, 11, 12])]))
            .await
            .unwrap();

        let played = store
            .recent_history(ids[0], HistoryKind::Played, 2, true)
            .await
            .unwrap();
        assert_eq!(played.len(), 2);
        assert_eq!(played[0].faction_ids, vec![FactionId(3)]);
        assert_eq!(played[1].faction_ids, vec![FactionId(1)]);
        assert!(played.iter().all(|e| e.finalized));

        let drafted = store
            .recent_history(ids[0], HistoryKind::Drafted, 2, false)
            .await
            .unwrap();
        assert_eq!(drafted.len(), 2);
        assert!(!drafted[0].finalized);
        assert_eq!(
            drafted[0].faction_ids,
            vec![FactionId(10), FactionId(11), FactionId(12)]
        );
        // Manual sessions count toward the window but carry no offers.
        assert!(drafted[1].faction_ids.is_empty());
    }

    #[tokio::test]
    async fn finalize_clears_pruned_winner() {
        let store = test_store().await;
        let ids = players(&store, &["Anna", "Bela", "Csaba"]).await;
        let record = store
            .persist_draft(draft(Utc::now(), vec![(ids[0], vec![1, 2, 3]), (ids[1], vec![4, 5, 6])]))
            .await
            .unwrap();
        let anna = record.participant_for(ids[0]).unwrap().id;
        store.set_selection(anna, FactionId(1)).await.unwrap();
        store.set_winner(record.id(), Some(ids[1])).await.unwrap();

        store.finalize_session(record.id()).await.unwrap();
        let closed = store.session(record.id()).await.unwrap().unwrap();
        assert_eq!(closed.session.winner, None);
    }

    #[tokio::test]
    async fn delete_session_removes_everything() {
        let store = test_store().await;
        let ids = players(&store, &["Anna", "Bela", "Csaba"]).await;
        let record = store
            .create_manual_session(Utc::now(), &[(ids[0], FactionId(1)), (ids[1], FactionId(2))])
            .await
            .unwrap();

        assert!(store.delete_session(record.id()).await.unwrap());
        assert!(!store.delete_session(record.id()).await.unwrap());
        let participant = record.participants[0].id;
        assert!(store.participant(participant).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("draft.sqlite");
        let path = path.to_string_lossy().into_owned();

        {
            let store = SqliteStore::new(&path).await.unwrap();
            store.seed_factions(FACTIONS).await.unwrap();
            store.add_player("Anna").await.unwrap();
        }

        let store = SqliteStore::new(&path).await.unwrap();
        assert_eq!(store.factions().await.unwrap().len(), FACTIONS.len());
        assert_eq!(store.active_players().await.unwrap()[0].name, "Anna");
    }

    #[tokio::test]
    async fn backend_name() {
        let store = test_store().await;
        assert_eq!(store.name(), "sqlite");
    }
}
