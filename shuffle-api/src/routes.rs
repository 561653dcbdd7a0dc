//! Command-surface handlers: one per row of the route table. Each
//! mirrors its `Controller`/store counterpart closely enough that the
//! handler body is mostly request/response plumbing.

use axum::extract::{Path, State};
use axum::Json;
use shuffle_controller::{tracks_from_entries, ControllerError, StatusSnapshot};
use shuffle_remote::DeviceInfo;

use crate::error::ApiError;
use crate::session::AuthedUser;
use crate::state::AppState;

pub async fn start(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(playlist_id): Path<String>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let entries = state.remote.get_playlist_tracks(user_id, &playlist_id).await.map_err(ControllerError::from)?;
    let tracks = tracks_from_entries(entries);
    let status = state.controller.start(user_id, &playlist_id, tracks).await?;
    Ok(Json(status))
}

pub async fn status(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(playlist_id): Path<String>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    state
        .controller
        .status(user_id, &playlist_id)
        .await
        .map(Json)
        .ok_or(ApiError::Controller(ControllerError::NoSession))
}

pub async fn next(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(playlist_id): Path<String>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    Ok(Json(state.controller.next(user_id, &playlist_id).await?))
}

pub async fn stop(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(playlist_id): Path<String>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    Ok(Json(state.controller.stop(user_id, &playlist_id).await?))
}

pub async fn refresh(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(playlist_id): Path<String>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let entries = state.remote.get_playlist_tracks(user_id, &playlist_id).await.map_err(ControllerError::from)?;
    let tracks = tracks_from_entries(entries);
    Ok(Json(state.controller.refresh(user_id, &playlist_id, tracks).await?))
}

pub async fn list_devices(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
) -> Result<Json<Vec<DeviceInfo>>, ApiError> {
    Ok(Json(state.controller.list_devices(user_id).await?))
}

pub async fn export_run(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(run_id): Path<i64>,
) -> Result<Json<shuffle_core::ExportPayload>, ApiError> {
    let run = state
        .store
        .runs
        .get(run_id)
        .await
        .map_err(|e| ApiError::Controller(ControllerError::from(e)))?
        .ok_or(ApiError::Controller(ControllerError::NotFound))?;
    if run.user_id != user_id {
        return Err(ApiError::Controller(ControllerError::NotFound));
    }
    Ok(Json(shuffle_core::export_run(&run)))
}

pub async fn import_run(body: String) -> Result<Json<shuffle_core::ExportPayload>, ApiError> {
    let payload = shuffle_core::import_run(&body).map_err(ApiError::Core)?;
    Ok(Json(payload))
}
