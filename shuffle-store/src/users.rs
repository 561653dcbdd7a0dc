//! Users/Tokens persistence, extended into typed storage the Remote
//! Client's [`TokenStore`] boundary reads and writes through.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use shuffle_remote::{Token, TokenStore};
use tokio_rusqlite::Connection;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub spotify_user_id: String,
    pub display_name: String,
}

pub struct UserStore {
    conn: Connection,
}

impl UserStore {
    pub(crate) fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Look up a user by their streaming-service id, creating one if
    /// absent.
    pub async fn find_or_create(
        &self,
        spotify_user_id: &str,
        display_name: &str,
    ) -> Result<User> {
        let spotify_user_id = spotify_user_id.to_string();
        let display_name = display_name.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users (spotify_user_id, display_name, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?3) \
                     ON CONFLICT(spotify_user_id) DO UPDATE SET display_name = excluded.display_name, \
                     updated_at = excluded.updated_at",
                    params![spotify_user_id, display_name, now],
                )?;
                let mut stmt = conn
                    .prepare_cached("SELECT id, spotify_user_id, display_name FROM users WHERE spotify_user_id = ?1")?;
                let user = stmt.query_row(params![spotify_user_id], |row| {
                    Ok(User {
                        id: row.get(0)?,
                        spotify_user_id: row.get(1)?,
                        display_name: row.get(2)?,
                    })
                })?;
                Ok(user)
            })
            .await
            .map_err(Into::into)
    }

    pub async fn save_token(&self, user_id: i64, token: &Token) -> Result<()> {
        let access_token = token.access_token.clone();
        let refresh_token = token.refresh_token.clone();
        let expires_at = token.expires_at.to_rfc3339();
        let scopes = token.scopes.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO tokens (user_id, access_token, refresh_token, expires_at, scopes) \
                     VALUES (?1, ?2, ?3, ?4, ?5) \
                     ON CONFLICT(user_id) DO UPDATE SET access_token = excluded.access_token, \
                     refresh_token = excluded.refresh_token, expires_at = excluded.expires_at, \
                     scopes = excluded.scopes",
                    params![user_id, access_token, refresh_token, expires_at, scopes],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    pub async fn load_token(&self, user_id: i64) -> Result<Token> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT access_token, refresh_token, expires_at, scopes FROM tokens WHERE user_id = ?1",
                )?;
                let token = stmt
                    .query_row(params![user_id], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    })
                    .optional()?;
                Ok(token)
            })
            .await
            .map_err(StoreError::from)?
            .map(|(access_token, refresh_token, expires_at, scopes)| Token {
                access_token,
                refresh_token,
                expires_at: expires_at.parse().unwrap_or_else(|_| Utc::now()),
                scopes,
            })
            .ok_or(StoreError::NoToken(user_id))
    }
}

/// Bridges the store's SQLite-backed token persistence into the
/// Remote Client's narrow [`TokenStore`] boundary.
#[async_trait]
impl TokenStore for UserStore {
    async fn load_token(&self, user_id: i64) -> shuffle_remote::Result<Token> {
        UserStore::load_token(self, user_id)
            .await
            .map_err(Into::into)
    }

    async fn save_token(&self, user_id: i64, token: &Token) -> shuffle_remote::Result<()> {
        UserStore::save_token(self, user_id, token)
            .await
            .map_err(Into::into)
    }
}

impl From<StoreError> for shuffle_remote::RemoteError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoToken(_) => shuffle_remote::RemoteError::AuthExpired,
            other => shuffle_remote::RemoteError::TransientRemote(other.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn in_memory_store() -> UserStore {
        let conn = Connection::open_in_memory().await.unwrap();
        conn.call(|conn| {
            conn.execute_batch(crate::schema::SCHEMA_SQL)?;
            Ok(())
        })
        .await
        .unwrap();
        UserStore::new(conn)
    }

    #[tokio::test]
    async fn find_or_create_is_idempotent() {
        let store = in_memory_store().await;
        let first = store.find_or_create("spotify-id-1", "Alice").await.unwrap();
        let second = store.find_or_create("spotify-id-1", "Alice Renamed").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.display_name, "Alice Renamed");
    }

    #[tokio::test]
    async fn save_and_load_token_round_trips() {
        let store = in_memory_store().await;
        let user = store.find_or_create("spotify-id-1", "Alice").await.unwrap();
        let token = Token {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            scopes: "user-read-playback-state".to_string(),
        };
        store.save_token(user.id, &token).await.unwrap();
        let loaded = store.load_token(user.id).await.unwrap();
        assert_eq!(loaded.access_token, token.access_token);
        assert_eq!(loaded.refresh_token, token.refresh_token);
    }

    #[tokio::test]
    async fn load_token_for_unknown_user_fails() {
        let store = in_memory_store().await;
        let err = store.load_token(999).await;
        assert!(err.is_err());
    }
}
