//! Shared application state injected into every handler via axum's
//! `State` extractor.

use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use shuffle_controller::Controller;
use shuffle_remote::SpotifyRemoteClient;
use shuffle_store::Store;

use crate::config::Config;
use crate::oauth::PendingAuthorizations;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub controller: Arc<Controller>,
    /// Playlist-track reads bypass the per-user lock and are not part
    /// of the `RemoteClient` capability boundary the controller uses,
    /// so handlers call this directly rather than through `Controller`.
    pub remote: Arc<SpotifyRemoteClient>,
    pub cookie_key: Key,
    pub pending_auth: Arc<PendingAuthorizations>,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}
