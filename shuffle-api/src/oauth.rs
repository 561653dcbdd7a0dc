//! OAuth/PKCE login flow, served as routes on the main router since this
//! service *is* the web app rather than a desktop client bootstrapping
//! itself against a local callback server.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use shuffle_controller::ControllerError;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::session::login_cookie;
use crate::state::AppState;

const SPOTIFY_AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SCOPES: &str = "user-read-playback-state user-modify-playback-state";

/// Pending authorization requests keyed by the `state` parameter,
/// holding the PKCE verifier until the callback arrives.
#[derive(Default)]
pub struct PendingAuthorizations {
    verifiers: StdMutex<HashMap<String, String>>,
}

impl PendingAuthorizations {
    fn insert(&self, state: String, verifier: String) {
        self.verifiers.lock().unwrap_or_else(|e| e.into_inner()).insert(state, verifier);
    }

    fn take(&self, state: &str) -> Option<String> {
        self.verifiers.lock().unwrap_or_else(|e| e.into_inner()).remove(state)
    }
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

pub async fn login(State(state): State<AppState>) -> impl IntoResponse {
    let verifier = random_string(64);
    let challenge = code_challenge(&verifier);
    let csrf_state = random_string(32);
    state.pending_auth.insert(csrf_state.clone(), verifier);

    let redirect_uri = state.config.redirect_uri();
    let url = format!(
        "{SPOTIFY_AUTHORIZE_URL}?client_id={client_id}&response_type=code&redirect_uri={redirect_uri}\
         &code_challenge_method=S256&code_challenge={challenge}&state={csrf_state}&scope={scope}",
        client_id = urlencoding::encode(&state.config.spotify_client_id),
        redirect_uri = urlencoding::encode(&redirect_uri),
        scope = urlencoding::encode(SCOPES),
    );
    Redirect::to(&url)
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
}

#[derive(serde::Deserialize)]
struct SpotifyProfile {
    id: String,
    display_name: Option<String>,
}

pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<(axum_extra::extract::SignedCookieJar, Redirect), ApiError> {
    if let Some(error) = params.error {
        warn!(%error, "spotify authorization denied");
        return Err(ApiError::BadRequest(format!("authorization denied: {error}")));
    }
    let code = params.code.ok_or_else(|| ApiError::BadRequest("missing code".to_string()))?;
    let csrf_state = params.state.ok_or_else(|| ApiError::BadRequest("missing state".to_string()))?;
    let verifier = state
        .pending_auth
        .take(&csrf_state)
        .ok_or_else(|| ApiError::BadRequest("unknown or expired state".to_string()))?;

    let redirect_uri = state.config.redirect_uri();
    let form = [
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("redirect_uri", redirect_uri.as_str()),
        ("client_id", state.config.spotify_client_id.as_str()),
        ("code_verifier", verifier.as_str()),
    ];

    let http = reqwest::Client::new();
    let resp = http
        .post(SPOTIFY_TOKEN_URL)
        .form(&form)
        .send()
        .await
        .map_err(|e| ApiError::BadRequest(format!("token exchange failed: {e}")))?;
    if !resp.status().is_success() {
        return Err(ApiError::BadRequest("token exchange rejected by Spotify".to_string()));
    }
    let token_response: TokenResponse = resp
        .json()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed token response: {e}")))?;

    let profile: SpotifyProfile = http
        .get("https://api.spotify.com/v1/me")
        .bearer_auth(&token_response.access_token)
        .send()
        .await
        .map_err(|e| ApiError::BadRequest(format!("profile lookup failed: {e}")))?
        .json()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed profile response: {e}")))?;

    let user = state
        .store
        .users
        .find_or_create(&profile.id, profile.display_name.as_deref().unwrap_or(&profile.id))
        .await
        .map_err(ControllerStoreError)?;

    let token = shuffle_remote::Token {
        access_token: token_response.access_token,
        refresh_token: token_response.refresh_token.unwrap_or_default(),
        expires_at: chrono::Utc::now() + chrono::Duration::seconds(token_response.expires_in),
        scopes: SCOPES.to_string(),
    };
    state
        .store
        .users
        .save_token(user.id, &token)
        .await
        .map_err(ControllerStoreError)?;

    info!(user_id = user.id, "spotify login completed");
    Ok((login_cookie(&state, user.id), Redirect::to("/")))
}

/// Small bridge so a `StoreError` surfaces through `ApiError` the same
/// way a `ControllerError::Store` would.
struct ControllerStoreError(shuffle_store::StoreError);

impl From<ControllerStoreError> for ApiError {
    fn from(err: ControllerStoreError) -> Self {
        Self::Controller(ControllerError::from(err.0))
    }
}
