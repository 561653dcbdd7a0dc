//! The Remote Client: authenticated HTTP calls against the streaming
//! service's Player and playlist-track endpoints, with one retry matrix
//! baked into a single request path.
//!
//! Deliberately built on raw `reqwest` rather than a higher-level
//! Spotify SDK: the retry matrix needs byte-level control over status
//! codes (single-shot 401 refresh, terminal 403/404, jittered 429/5xx
//! backoff) that a wrapping SDK's own call path tends to hide.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use tracing::warn;

use crate::error::{RemoteError, Result};
use crate::models::{
    DevicesResponse, PlayRequestBody, PlaybackSnapshot, PlaylistTracksPage,
};
use crate::serializer::PerUserSerializer;
use crate::token::{Token, TokenStore};

const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";
const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const MAX_ATTEMPTS: u32 = 3;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// A device the user could play on.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub id: Option<String>,
    pub name: String,
    pub is_active: bool,
    pub device_type: String,
}

/// What the poll loop needs from a playback snapshot.
#[derive(Debug, Clone, Default)]
pub struct PlaybackObservation {
    pub is_playing: bool,
    pub track_uri: Option<String>,
    pub track_name: Option<String>,
    pub artist: Option<String>,
    pub album_art: Option<String>,
}

/// The narrow capability boundary the reconciliation loop depends on.
/// Tests substitute a fake implementation instead of hitting the
/// network.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn list_devices(&self, user_id: i64) -> Result<Vec<DeviceInfo>>;
    async fn get_playback(&self, user_id: i64) -> Result<Option<PlaybackObservation>>;
    async fn play(&self, user_id: i64, uris: &[String], device_id: Option<&str>) -> Result<()>;
    async fn enqueue(&self, user_id: i64, uri: &str, device_id: Option<&str>) -> Result<()>;
    async fn pause(&self, user_id: i64, device_id: Option<&str>) -> Result<()>;
}

pub struct SpotifyRemoteClient {
    http: reqwest::Client,
    client_id: String,
    token_store: Arc<dyn TokenStore>,
    serializer: Arc<PerUserSerializer>,
}

impl SpotifyRemoteClient {
    /// # Panics
    /// Panics only if the underlying TLS backend cannot be
    /// initialized, matching `reqwest::Client::new`'s own contract.
    #[must_use]
    pub fn new(client_id: String, token_store: Arc<dyn TokenStore>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(READ_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            client_id,
            token_store,
            serializer: Arc::new(PerUserSerializer::new()),
        }
    }

    async fn ensure_fresh_token(&self, user_id: i64) -> Result<Token> {
        let token = self.token_store.load_token(user_id).await?;
        if token.needs_refresh() {
            self.force_refresh(user_id, &token).await
        } else {
            Ok(token)
        }
    }

    async fn force_refresh(&self, user_id: i64, current: &Token) -> Result<Token> {
        #[derive(serde::Deserialize)]
        struct RefreshResponse {
            access_token: String,
            #[serde(default)]
            refresh_token: Option<String>,
            expires_in: i64,
        }

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", current.refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
        ];
        let resp = self
            .http
            .post(SPOTIFY_TOKEN_URL)
            .form(&params)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(RemoteError::AuthExpired);
        }
        let parsed: RefreshResponse = resp.json().await?;
        let refreshed = Token {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token.unwrap_or_else(|| current.refresh_token.clone()),
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(parsed.expires_in),
            scopes: current.scopes.clone(),
        };
        self.token_store.save_token(user_id, &refreshed).await?;
        Ok(refreshed)
    }

    fn backoff(attempt: u32) -> Duration {
        let jitter: f64 = rand::thread_rng().gen_range(0.0..0.5);
        #[allow(clippy::cast_precision_loss)]
        let exp = 0.5 * 2f64.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        Duration::from_secs_f64((exp + jitter).min(30.0))
    }

    /// Execute one logical call with the full retry matrix. `use_lock`
    /// gates per-user serialization: Player-mutating/observing calls
    /// must set this; playlist-track reads must not.
    async fn execute<B: Serialize + ?Sized>(
        &self,
        user_id: i64,
        method: Method,
        path: &str,
        body: Option<&B>,
        query: Option<&[(&str, &str)]>,
        use_lock: bool,
    ) -> Result<reqwest::Response> {
        let guard = if use_lock {
            Some(self.serializer.acquire(user_id).await)
        } else {
            None
        };
        let _held = match &guard {
            Some(g) => Some(g.hold().await),
            None => None,
        };

        let mut refreshed_after_401 = false;
        for attempt in 1..=MAX_ATTEMPTS {
            let token = self.ensure_fresh_token(user_id).await?;
            let mut req = self
                .http
                .request(method.clone(), format!("{SPOTIFY_API_BASE}{path}"))
                .bearer_auth(&token.access_token);
            if let Some(b) = body {
                req = req.json(b);
            }
            if let Some(q) = query {
                req = req.query(q);
            }

            let sent = req.send().await;
            let response = match sent {
                Ok(r) => r,
                Err(e) if e.is_timeout() && attempt < MAX_ATTEMPTS => {
                    warn!(attempt, "request timed out, retrying");
                    tokio::time::sleep(Self::backoff(attempt)).await;
                    continue;
                }
                Err(e) if e.is_timeout() => {
                    return Err(RemoteError::TransientRemote("timeout".to_string()))
                }
                Err(e) => return Err(RemoteError::Http(e)),
            };

            match response.status() {
                StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = response
                        .headers()
                        .get("Retry-After")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(2);
                    if attempt < MAX_ATTEMPTS {
                        let jitter: f64 = rand::thread_rng().gen_range(0.0..0.5);
                        warn!(attempt, retry_after, "429 rate limited, retrying");
                        tokio::time::sleep(Duration::from_secs_f64(
                            retry_after as f64 + jitter,
                        ))
                        .await;
                        continue;
                    }
                    return Err(RemoteError::RateLimited);
                }
                StatusCode::UNAUTHORIZED if !refreshed_after_401 => {
                    refreshed_after_401 = true;
                    warn!("401 unexpected, forcing token refresh and retrying once");
                    let token = self.token_store.load_token(user_id).await?;
                    self.force_refresh(user_id, &token).await?;
                    continue;
                }
                StatusCode::UNAUTHORIZED => return Err(RemoteError::AuthExpired),
                StatusCode::FORBIDDEN => return Err(RemoteError::PremiumRequired),
                StatusCode::NOT_FOUND => return Err(RemoteError::NotFound),
                status if status.is_server_error() => {
                    if attempt < MAX_ATTEMPTS {
                        warn!(attempt, %status, "server error, retrying with backoff");
                        tokio::time::sleep(Self::backoff(attempt)).await;
                        continue;
                    }
                    return Err(RemoteError::TransientRemote(status.to_string()));
                }
                status if status.is_client_error() => {
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(RemoteError::ClientError {
                        status: status.as_u16(),
                        body: body_text,
                    });
                }
                _ => return Ok(response),
            }
        }
        Err(RemoteError::TransientRemote("retries exhausted".to_string()))
    }

    /// Fetch every track on a playlist, following pagination. Not a
    /// Player call, so it bypasses the per-user lock.
    pub async fn get_playlist_tracks(
        &self,
        user_id: i64,
        playlist_id: &str,
    ) -> Result<Vec<crate::models::PlaylistTrackEntry>> {
        let mut items = Vec::new();
        let mut path = format!("/playlists/{playlist_id}/tracks?limit=100&offset=0");
        loop {
            let response = self
                .execute::<()>(user_id, Method::GET, &path, None, None, false)
                .await?;
            let page: PlaylistTracksPage = response.json().await?;
            items.extend(page.items);
            match page.next {
                Some(next) => {
                    let Some(suffix) = next.strip_prefix(SPOTIFY_API_BASE) else {
                        break;
                    };
                    path = suffix.to_string();
                }
                None => break,
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl RemoteClient for SpotifyRemoteClient {
    async fn list_devices(&self, user_id: i64) -> Result<Vec<DeviceInfo>> {
        let response = self
            .execute::<()>(user_id, Method::GET, "/me/player/devices", None, None, true)
            .await?;
        let parsed: DevicesResponse = response.json().await?;
        Ok(parsed
            .devices
            .into_iter()
            .map(|d| DeviceInfo {
                id: d.id,
                name: d.name,
                is_active: d.is_active,
                device_type: d.device_type,
            })
            .collect())
    }

    async fn get_playback(&self, user_id: i64) -> Result<Option<PlaybackObservation>> {
        let response = self
            .execute::<()>(user_id, Method::GET, "/me/player", None, None, true)
            .await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let body = response.text().await?;
        if body.is_empty() {
            return Ok(None);
        }
        let snapshot: PlaybackSnapshot = serde_json::from_str(&body)?;
        Ok(Some(PlaybackObservation {
            is_playing: snapshot.is_playing,
            track_uri: snapshot.item.as_ref().map(|t| t.uri.clone()),
            track_name: snapshot.item.as_ref().map(|t| t.name.clone()),
            artist: snapshot.item.as_ref().map(|t| t.first_artist_name()),
            album_art: snapshot.item.as_ref().and_then(|t| t.first_album_art_url()),
        }))
    }

    async fn play(&self, user_id: i64, uris: &[String], device_id: Option<&str>) -> Result<()> {
        let body = PlayRequestBody {
            uris: if uris.is_empty() {
                None
            } else {
                Some(uris.to_vec())
            },
            position_ms: Some(0),
        };
        let query = device_id.map(|d| [("device_id", d)]);
        self.execute(
            user_id,
            Method::PUT,
            "/me/player/play",
            Some(&body),
            query.as_ref().map(|q| q.as_slice()),
            true,
        )
        .await?;
        Ok(())
    }

    async fn enqueue(&self, user_id: i64, uri: &str, device_id: Option<&str>) -> Result<()> {
        let mut query = vec![("uri", uri)];
        if let Some(device) = device_id {
            query.push(("device_id", device));
        }
        self.execute::<()>(
            user_id,
            Method::POST,
            "/me/player/queue",
            None,
            Some(&query),
            true,
        )
        .await?;
        Ok(())
    }

    async fn pause(&self, user_id: i64, device_id: Option<&str>) -> Result<()> {
        let query = device_id.map(|d| [("device_id", d)]);
        self.execute::<()>(
            user_id,
            Method::PUT,
            "/me/player/pause",
            None,
            query.as_ref().map(|q| q.as_slice()),
            true,
        )
        .await?;
        Ok(())
    }
}
