//! Durable storage: the Run Store plus Users/Tokens persistence,
//! both `tokio-rusqlite`-backed.

pub mod error;
pub mod runs;
pub mod schema;
pub mod users;

pub use error::{Result, StoreError};
pub use runs::RunStore;
pub use users::{User, UserStore};

use std::path::Path;

use async_trait::async_trait;
use shuffle_remote::{Token, TokenStore};
use tokio_rusqlite::Connection;
use tracing::info;

/// Opens one SQLite connection and hands out the two store facades
/// that share it.
pub struct Store {
    conn: Connection,
    pub runs: RunStore,
    pub users: UserStore,
}

impl Store {
    /// # Errors
    /// Returns an error if the database cannot be opened or the
    /// schema cannot be initialized.
    pub async fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening database");
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).await?;
        conn.call(|conn| {
            conn.execute_batch(schema::SCHEMA_SQL)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(())
        })
        .await?;

        // tokio-rusqlite's `Connection` is a cheaply-cloneable handle
        // onto the single background-thread connection; each facade
        // gets its own handle rather than sharing a reference.
        Ok(Self {
            runs: RunStore::new(conn.clone()),
            users: UserStore::new(conn.clone()),
            conn,
        })
    }

    /// A second handle onto the Run Store, sharing this store's
    /// connection. Lets a long-lived component (the Controller) hold
    /// its own `RunStore` without taking the whole `Store` (which also
    /// owns the `TokenStore` and shutdown checkpoint).
    #[must_use]
    pub fn run_store(&self) -> RunStore {
        RunStore::new(self.conn.clone())
    }

    /// Flush the WAL into the main database file. Call on shutdown.
    pub async fn checkpoint(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.pragma_update(None, "wal_checkpoint", "TRUNCATE")?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }
}

/// Lets the whole store stand in for the Remote Client's narrow token
/// boundary, so callers can hand an `Arc<Store>` where a
/// `TokenStore` is expected instead of threading `UserStore` through
/// separately.
#[async_trait]
impl TokenStore for Store {
    async fn load_token(&self, user_id: i64) -> shuffle_remote::Result<Token> {
        self.users.load_token(user_id).await.map_err(Into::into)
    }

    async fn save_token(&self, user_id: i64, token: &Token) -> shuffle_remote::Result<()> {
        self.users.save_token(user_id, token).await.map_err(Into::into)
    }
}
