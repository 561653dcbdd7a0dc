//! Session Registry: in-memory `(user, playlist) -> Session` map.
//! Process-local and authoritative for "is there a live loop?"; the
//! Run Store is authoritative for "is there durable progress to
//! resume?".

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::session::Session;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<(i64, String), Arc<Session>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, user_id: i64, playlist_id: &str) -> Option<Arc<Session>> {
        let sessions = self.sessions.lock().await;
        sessions.get(&(user_id, playlist_id.to_string())).cloned()
    }

    pub async fn insert(&self, session: Arc<Session>) {
        let mut sessions = self.sessions.lock().await;
        sessions.insert((session.user_id, session.playlist_id.clone()), session);
    }

    pub async fn remove(&self, user_id: i64, playlist_id: &str) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(&(user_id, playlist_id.to_string()))
    }

    /// Every live session, for shutdown teardown.
    pub async fn all(&self) -> Vec<Arc<Session>> {
        let sessions = self.sessions.lock().await;
        sessions.values().cloned().collect()
    }
}
