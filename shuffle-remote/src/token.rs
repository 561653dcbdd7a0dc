//! Token shape and the storage boundary the Remote Client refreshes
//! through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    /// Space-separated OAuth scopes granted at login. Carried for
    /// introspection; refresh does not re-request scopes.
    pub scopes: String,
}

impl Token {
    /// Proactive refresh threshold: refresh if expiry is within 60
    /// seconds.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        Utc::now() + chrono::Duration::seconds(60) >= self.expires_at
    }
}

/// Narrow persistence boundary the Remote Client reads/writes through.
/// Implemented by `shuffle-store`; kept here (rather than depending on
/// the store crate) so the Remote Client has no knowledge of SQLite.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load_token(&self, user_id: i64) -> Result<Token>;
    async fn save_token(&self, user_id: i64, token: &Token) -> Result<()>;
}
