//! Run Store: durable `(user, playlist, mode, order, cursor,
//! queued_until_index, status)` records, with a partial unique index
//! guaranteeing at most one active controller run per (user, playlist).

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use shuffle_core::{Mode, Run, RunStatus, SkipReason, SkippedTrack};
use tokio_rusqlite::Connection;

use crate::error::Result;

pub struct RunStore {
    conn: Connection,
}

fn mode_str(mode: Mode) -> &'static str {
    match mode {
        Mode::Utility => "utility",
        Mode::Controller => "controller",
    }
}

fn mode_from_str(s: &str) -> Mode {
    match s {
        "utility" => Mode::Utility,
        _ => Mode::Controller,
    }
}

fn status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Active => "active",
        RunStatus::Completed => "completed",
        RunStatus::Cancelled => "cancelled",
    }
}

fn status_from_str(s: &str) -> RunStatus {
    match s {
        "completed" => RunStatus::Completed,
        "cancelled" => RunStatus::Cancelled,
        _ => RunStatus::Active,
    }
}

fn reason_str(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::Local => "local",
        SkipReason::Episode => "episode",
        SkipReason::Unavailable => "unavailable",
        SkipReason::Duplicate => "duplicate",
    }
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<Run> {
    let order_json: String = row.get("shuffled_order")?;
    let order: Vec<String> = serde_json::from_str(&order_json).unwrap_or_default();
    let mode_text: String = row.get("mode")?;
    let status_text: String = row.get("status")?;
    let cursor: i64 = row.get("cursor")?;
    let queued_until_index: i64 = row.get("queued_until_index")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(Run {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        playlist_id: row.get("playlist_id")?,
        mode: mode_from_str(&mode_text),
        order,
        cursor: usize::try_from(cursor).unwrap_or(0),
        queued_until_index: usize::try_from(queued_until_index).unwrap_or(0),
        status: status_from_str(&status_text),
        created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: updated_at.parse().unwrap_or_else(|_| Utc::now()),
    })
}

impl RunStore {
    pub(crate) fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// `find_active_controller(user, playlist)`.
    pub async fn find_active_controller(
        &self,
        user_id: i64,
        playlist_id: &str,
    ) -> Result<Option<Run>> {
        let playlist_id = playlist_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT * FROM runs WHERE user_id = ?1 AND playlist_id = ?2 \
                     AND mode = 'controller' AND status = 'active'",
                )?;
                let run = stmt
                    .query_row(params![user_id, playlist_id], row_to_run)
                    .optional()?;
                Ok(run)
            })
            .await
            .map_err(Into::into)
    }

    /// `create(user, playlist, mode, order)`. Idempotent against a
    /// concurrent `start`: relies on the partial unique index so two
    /// racing inserts resolve to one active row.
    pub async fn create(
        &self,
        user_id: i64,
        playlist_id: &str,
        mode: Mode,
        order: Vec<String>,
    ) -> Result<Run> {
        let playlist_id = playlist_id.to_string();
        let order_json = serde_json::to_string(&order)?;
        let now = Utc::now().to_rfc3339();
        let mode_value = mode_str(mode);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO runs (user_id, playlist_id, mode, shuffled_order, cursor, \
                     queued_until_index, status, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, 0, 0, 'active', ?5, ?5) \
                     ON CONFLICT DO NOTHING",
                    params![user_id, playlist_id, mode_value, order_json, now],
                )?;
                let mut stmt = conn.prepare_cached(
                    "SELECT * FROM runs WHERE user_id = ?1 AND playlist_id = ?2 \
                     AND mode = ?3 AND status = 'active'",
                )?;
                let run = stmt.query_row(params![user_id, playlist_id, mode_value], row_to_run)?;
                Ok(run)
            })
            .await
            .map_err(Into::into)
    }

    /// Persist `cursor`/`queued_until_index`. Called before returning
    /// control to the caller or before the next poll iteration — the
    /// loop never advances past an uncommitted write.
    pub async fn update_cursor(
        &self,
        run_id: i64,
        cursor: usize,
        queued_until_index: usize,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let cursor = i64::try_from(cursor).unwrap_or(i64::MAX);
        let queued_until_index = i64::try_from(queued_until_index).unwrap_or(i64::MAX);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE runs SET cursor = ?1, queued_until_index = ?2, updated_at = ?3 \
                     WHERE id = ?4",
                    params![cursor, queued_until_index, now, run_id],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    pub async fn mark_status(&self, run_id: i64, status: RunStatus) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let status_value = status_str(status);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE runs SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    params![status_value, now, run_id],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    pub async fn insert_skipped(&self, run_id: i64, entries: Vec<SkippedTrack>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare_cached(
                        "INSERT INTO skipped_tracks (run_id, uri, reason, created_at) \
                         VALUES (?1, ?2, ?3, ?4)",
                    )?;
                    for entry in &entries {
                        stmt.execute(params![
                            run_id,
                            entry.uri,
                            reason_str(entry.reason),
                            now
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    pub async fn get(&self, run_id: i64) -> Result<Option<Run>> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached("SELECT * FROM runs WHERE id = ?1")?;
                let run = stmt.query_row(params![run_id], row_to_run).optional()?;
                Ok(run)
            })
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn in_memory_store() -> RunStore {
        let conn = Connection::open_in_memory().await.unwrap();
        conn.call(|conn| {
            conn.execute_batch(crate::schema::SCHEMA_SQL)?;
            conn.execute(
                "INSERT INTO users (id, spotify_user_id, display_name, created_at, updated_at) \
                 VALUES (1, 'u1', 'User One', '2024-01-01', '2024-01-01')",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();
        RunStore::new(conn)
    }

    #[tokio::test]
    async fn create_then_find_active_round_trips() {
        let store = in_memory_store().await;
        let order = vec!["spotify:track:1".to_string(), "spotify:track:2".to_string()];
        let created = store
            .create(1, "pl1", Mode::Controller, order.clone())
            .await
            .unwrap();
        assert_eq!(created.order, order);
        assert_eq!(created.cursor, 0);

        let found = store.find_active_controller(1, "pl1").await.unwrap();
        assert_eq!(found.unwrap().id, created.id);
    }

    #[tokio::test]
    async fn concurrent_create_resolves_to_one_active_run() {
        let store = in_memory_store().await;
        let order = vec!["spotify:track:1".to_string()];
        let first = store
            .create(1, "pl1", Mode::Controller, order.clone())
            .await
            .unwrap();
        let second = store.create(1, "pl1", Mode::Controller, order).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn update_cursor_persists() {
        let store = in_memory_store().await;
        let order = vec!["spotify:track:1".to_string(), "spotify:track:2".to_string()];
        let run = store.create(1, "pl1", Mode::Controller, order).await.unwrap();
        store.update_cursor(run.id, 1, 1).await.unwrap();
        let reloaded = store.get(run.id).await.unwrap().unwrap();
        assert_eq!(reloaded.cursor, 1);
        assert_eq!(reloaded.queued_until_index, 1);
    }

    #[tokio::test]
    async fn mark_status_completed() {
        let store = in_memory_store().await;
        let order = vec!["spotify:track:1".to_string()];
        let run = store.create(1, "pl1", Mode::Controller, order).await.unwrap();
        store.mark_status(run.id, RunStatus::Completed).await.unwrap();
        let reloaded = store.get(run.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, RunStatus::Completed);
        // Completed is not active, so a fresh create for the same
        // (user, playlist) should now succeed as a new row.
        let next = store
            .create(1, "pl1", Mode::Controller, vec!["spotify:track:2".to_string()])
            .await
            .unwrap();
        assert_ne!(next.id, run.id);
    }
}
