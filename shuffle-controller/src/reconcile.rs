//! The Controller: device selection, buffer fill, hard-play/
//! hard-override, the poll loop, and the user-facing
//! start/next/stop/refresh/list_devices operations.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use rand::thread_rng;
use shuffle_core::{prepare_shuffled_run, Mode, RunStatus, Track};
use shuffle_remote::{DeviceInfo, PlaybackObservation, RemoteClient, RemoteError};
use shuffle_store::RunStore;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{ControllerError, Result};
use crate::registry::SessionRegistry;
use crate::session::{ControllerState, Session, SessionInner, StatusSnapshot};

/// Poll cadence while a session is `playing`.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Multi-skip scan window: offsets checked after the natural-advance
/// slot (`cursor + 1`) fails to match.
const MULTI_SKIP_OFFSETS: Range<usize> = 2..5;

/// Convert remote playlist entries into the domain `Track` shape the
/// shuffle engine consumes.
#[must_use]
pub fn tracks_from_entries(entries: Vec<shuffle_remote::models::PlaylistTrackEntry>) -> Vec<Track> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let track = entry.track?;
            Some(Track {
                uri: track.uri.unwrap_or_default(),
                name: track.name,
                artist: track.artists.first().map_or_else(String::new, |a| a.name.clone()),
                is_playable: track.is_playable.unwrap_or(true),
                is_local: entry.is_local,
                track_type: track.item_type,
            })
        })
        .collect()
}

pub struct Controller {
    remote: Arc<dyn RemoteClient>,
    store: Arc<RunStore>,
    registry: Arc<SessionRegistry>,
    buffer_size: usize,
}

impl Controller {
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteClient>,
        store: Arc<RunStore>,
        registry: Arc<SessionRegistry>,
        buffer_size: usize,
    ) -> Self {
        Self {
            remote,
            store,
            registry,
            buffer_size,
        }
    }

    /// `start(user, playlist)`. Idempotent: if a live session already
    /// exists, returns its current status without re-seeding.
    pub async fn start(
        &self,
        user_id: i64,
        playlist_id: &str,
        tracks: Vec<Track>,
    ) -> Result<StatusSnapshot> {
        if let Some(session) = self.registry.get(user_id, playlist_id).await {
            let inner = session.inner.lock().await;
            if inner.poll_task.is_some() {
                return Ok(inner.snapshot());
            }
        }

        let run = if let Some(existing) =
            self.store.find_active_controller(user_id, playlist_id).await?
        {
            existing
        } else {
            let (order, skipped) = prepare_shuffled_run(tracks, None, &mut thread_rng());
            if order.is_empty() {
                return Err(ControllerError::InvalidRun);
            }
            let run = self.store.create(user_id, playlist_id, Mode::Controller, order).await?;
            self.store.insert_skipped(run.id, skipped).await?;
            run
        };

        let session = Arc::new(Session::new(
            run.id,
            user_id,
            playlist_id.to_string(),
            run.order.clone(),
            run.cursor,
        ));
        self.registry.insert(session.clone()).await;

        let mut inner = session.inner.lock().await;
        inner.state = ControllerState::Starting;
        self.hard_play_and_launch(&session, &mut inner).await?;
        Ok(inner.snapshot())
    }

    pub async fn status(&self, user_id: i64, playlist_id: &str) -> Option<StatusSnapshot> {
        let session = self.registry.get(user_id, playlist_id).await?;
        let inner = session.inner.lock().await;
        Some(inner.snapshot())
    }

    /// `next(user, playlist)`.
    pub async fn next(&self, user_id: i64, playlist_id: &str) -> Result<StatusSnapshot> {
        let session = self
            .registry
            .get(user_id, playlist_id)
            .await
            .ok_or(ControllerError::NoSession)?;
        let mut inner = session.inner.lock().await;

        if inner.cursor + 1 >= inner.order.len() {
            inner.cursor = inner.order.len();
            Self::cancel_poll_task(&mut inner).await;
            inner.state = ControllerState::Completed;
            self.store
                .update_cursor(session.run_id, inner.cursor, inner.queued_until_index)
                .await?;
            self.store.mark_status(session.run_id, RunStatus::Completed).await?;
            return Ok(inner.snapshot());
        }

        inner.cursor += 1;
        Self::cancel_poll_task(&mut inner).await;
        self.hard_play_and_launch(&session, &mut inner).await?;
        Ok(inner.snapshot())
    }

    /// `stop(user, playlist)`: cancel the loop, await its termination,
    /// persist cursor, state = idle. Does not touch device playback.
    pub async fn stop(&self, user_id: i64, playlist_id: &str) -> Result<StatusSnapshot> {
        let session = self
            .registry
            .get(user_id, playlist_id)
            .await
            .ok_or(ControllerError::NoSession)?;
        let mut inner = session.inner.lock().await;
        Self::cancel_poll_task(&mut inner).await;
        inner.state = ControllerState::Idle;
        self.store
            .update_cursor(session.run_id, inner.cursor, inner.queued_until_index)
            .await?;
        Ok(inner.snapshot())
    }

    /// `refresh(user, playlist)`: stop if running, mark the durable
    /// run cancelled, drop from the registry, seed a fresh run.
    pub async fn refresh(
        &self,
        user_id: i64,
        playlist_id: &str,
        tracks: Vec<Track>,
    ) -> Result<StatusSnapshot> {
        let previous_order = if let Some(session) = self.registry.remove(user_id, playlist_id).await {
            let mut inner = session.inner.lock().await;
            Self::cancel_poll_task(&mut inner).await;
            self.store.mark_status(session.run_id, RunStatus::Cancelled).await?;
            Some(inner.order.clone())
        } else {
            None
        };

        let (order, skipped) =
            prepare_shuffled_run(tracks, previous_order.as_deref(), &mut thread_rng());
        if order.is_empty() {
            return Err(ControllerError::InvalidRun);
        }
        let run = self.store.create(user_id, playlist_id, Mode::Controller, order).await?;
        self.store.insert_skipped(run.id, skipped).await?;

        let session = Arc::new(Session::new(run.id, user_id, playlist_id.to_string(), run.order.clone(), 0));
        self.registry.insert(session.clone()).await;
        let mut inner = session.inner.lock().await;
        inner.state = ControllerState::Starting;
        self.hard_play_and_launch(&session, &mut inner).await?;
        Ok(inner.snapshot())
    }

    pub async fn list_devices(&self, user_id: i64) -> Result<Vec<DeviceInfo>> {
        Ok(self.remote.list_devices(user_id).await?)
    }

    /// Cancel every live session's loop and await termination, for
    /// graceful shutdown.
    pub async fn shutdown(&self) {
        for session in self.registry.all().await {
            let mut inner = session.inner.lock().await;
            Self::cancel_poll_task(&mut inner).await;
            let _ = self
                .store
                .update_cursor(session.run_id, inner.cursor, inner.queued_until_index)
                .await;
        }
    }

    async fn cancel_poll_task(inner: &mut SessionInner) {
        if let Some((handle, token)) = inner.poll_task.take() {
            token.cancel();
            let _ = handle.await;
        }
    }

    /// Device selection: first `is_active`, else first, else none.
    fn select_device(devices: &[DeviceInfo]) -> Option<String> {
        devices
            .iter()
            .find(|d| d.is_active)
            .or_else(|| devices.first())
            .and_then(|d| d.id.clone())
    }

    /// Hard-play `order[cursor]`, fill the buffer, and (on success)
    /// launch the poll loop. Used by `start`, `next`, and `refresh`.
    async fn hard_play_and_launch(&self, session: &Arc<Session>, inner: &mut SessionInner) -> Result<()> {
        let devices = self.remote.list_devices(session.user_id).await?;
        let Some(device_id) = Self::select_device(&devices) else {
            inner.state = ControllerState::NoDevice;
            inner.error_message = Some(
                "No active playback device found. Open Spotify on a device and retry.".to_string(),
            );
            return Ok(());
        };
        inner.device_id = Some(device_id.clone());

        let Some(expected) = inner.order.get(inner.cursor).cloned() else {
            inner.state = ControllerState::Completed;
            return Ok(());
        };

        match self.remote.play(session.user_id, &[expected], Some(&device_id)).await {
            Ok(()) => {}
            Err(RemoteError::PremiumRequired) => {
                inner.state = ControllerState::Error;
                inner.error_message = Some("Spotify Premium is required to control playback.".to_string());
                return Ok(());
            }
            Err(other) => {
                inner.state = ControllerState::Error;
                inner.error_message = Some(other.to_string());
                return Ok(());
            }
        }

        inner.queued_until_index = inner.cursor;
        self.fill_buffer(session.run_id, session.user_id, inner).await?;
        inner.state = ControllerState::Playing;
        self.spawn_poll_loop(session, inner);
        Ok(())
    }

    /// Buffer fill: enqueue `order[max(queued_until_index, cursor)+1
    /// ..= min(cursor+buffer_size, |order|-1)]`. Idempotent-safe:
    /// never re-enqueues indices already past `queued_until_index`.
    async fn fill_buffer(&self, run_id: i64, user_id: i64, inner: &mut SessionInner) -> Result<()> {
        fill_buffer_impl(self.remote.as_ref(), self.store.as_ref(), run_id, user_id, inner, self.buffer_size).await
    }

    fn spawn_poll_loop(&self, session: &Arc<Session>, inner: &mut SessionInner) {
        let remote = self.remote.clone();
        let store = self.store.clone();
        let buffer_size = self.buffer_size;
        let session = session.clone();
        let token = CancellationToken::new();
        let loop_token = token.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = loop_token.cancelled() => break,
                    () = tokio::time::sleep(POLL_INTERVAL) => {}
                }
                match poll_once(&session, remote.as_ref(), store.as_ref(), buffer_size).await {
                    PollOutcome::Continue => {}
                    PollOutcome::Stop => break,
                }
            }
        });

        inner.poll_task = Some((handle, token));
    }
}

enum PollOutcome {
    Continue,
    Stop,
}

/// One poll iteration: get playback, classify the delta, mutate
/// cursor/state, persist, refill. Cooperative cancellation happens at
/// the `select!` in the spawning loop, between iterations.
async fn poll_once(
    session: &Session,
    remote: &dyn RemoteClient,
    store: &RunStore,
    buffer_size: usize,
) -> PollOutcome {
    let mut inner = session.inner.lock().await;
    if inner.state != ControllerState::Playing {
        return PollOutcome::Stop;
    }

    let observation = match remote.get_playback(session.user_id).await {
        Ok(obs) => obs,
        Err(RemoteError::PremiumRequired) => {
            inner.state = ControllerState::Error;
            inner.error_message = Some("Spotify Premium is required to control playback.".to_string());
            return PollOutcome::Stop;
        }
        Err(err) => {
            warn!(error = %err, "poll iteration failed transiently, continuing");
            return PollOutcome::Continue;
        }
    };

    let Some(observation) = observation else {
        return PollOutcome::Continue;
    };
    apply_observation_metadata(&mut inner, &observation);
    if !observation.is_playing {
        return PollOutcome::Continue;
    }
    let Some(current) = observation.track_uri else {
        return PollOutcome::Continue;
    };

    let expected = inner.order.get(inner.cursor).cloned();
    if expected.as_deref() == Some(current.as_str()) {
        return PollOutcome::Continue;
    }

    if inner.order.get(inner.cursor + 1).map(String::as_str) == Some(current.as_str()) {
        inner.state = ControllerState::Advancing;
        inner.cursor += 1;
        if let Err(err) = fill_buffer_impl(remote, store, session.run_id, session.user_id, &mut inner, buffer_size).await {
            warn!(error = %err, "buffer fill failed after natural advance");
        }
        inner.state = ControllerState::Playing;
        return PollOutcome::Continue;
    }

    let multi_skip = MULTI_SKIP_OFFSETS
        .clone()
        .find(|k| inner.order.get(inner.cursor + k).map(String::as_str) == Some(current.as_str()));
    if let Some(k) = multi_skip {
        inner.cursor += k;
        if let Err(err) = fill_buffer_impl(remote, store, session.run_id, session.user_id, &mut inner, buffer_size).await {
            warn!(error = %err, "buffer fill failed after multi-skip");
        }
        inner.state = ControllerState::Playing;
        return PollOutcome::Continue;
    }

    // Foreign track: hard-override.
    inner.state = ControllerState::Overriding;
    let Some(expected_uri) = inner.order.get(inner.cursor).cloned() else {
        inner.state = ControllerState::Completed;
        return PollOutcome::Stop;
    };
    let device_id = inner.device_id.clone();
    match remote.play(session.user_id, &[expected_uri], device_id.as_deref()).await {
        Ok(()) => {
            inner.queued_until_index = inner.cursor;
            if let Err(err) = fill_buffer_impl(remote, store, session.run_id, session.user_id, &mut inner, buffer_size).await {
                warn!(error = %err, "buffer fill failed after hard-override");
            }
            inner.state = ControllerState::Playing;
            PollOutcome::Continue
        }
        Err(RemoteError::PremiumRequired) => {
            inner.state = ControllerState::Error;
            inner.error_message = Some("Spotify Premium is required to control playback.".to_string());
            PollOutcome::Stop
        }
        Err(err) => {
            inner.state = ControllerState::Error;
            inner.error_message = Some(err.to_string());
            PollOutcome::Stop
        }
    }
}

fn apply_observation_metadata(inner: &mut SessionInner, observation: &PlaybackObservation) {
    inner.current_track_uri = observation.track_uri.clone();
    inner.current_track_name = observation.track_name.clone();
    inner.current_artist = observation.artist.clone();
    inner.current_album_art = observation.album_art.clone();
}

/// Shared buffer-fill policy used both from a user-command handler
/// (holding `&Controller`) and from the free-standing poll task
/// (holding only the shared `Arc`s it was spawned with).
async fn fill_buffer_impl(
    remote: &dyn RemoteClient,
    store: &RunStore,
    run_id: i64,
    user_id: i64,
    inner: &mut SessionInner,
    buffer_size: usize,
) -> Result<()> {
    if inner.order.is_empty() {
        return Ok(());
    }
    let end = (inner.cursor + buffer_size).min(inner.order.len() - 1);
    let start_from = inner.queued_until_index.max(inner.cursor) + 1;
    let mut last_success = inner.queued_until_index;

    for i in start_from..=end {
        let Some(uri) = inner.order.get(i).cloned() else {
            break;
        };
        match remote.enqueue(user_id, &uri, inner.device_id.as_deref()).await {
            Ok(()) => last_success = i,
            Err(err) => {
                warn!(error = %err, index = i, "buffer fill enqueue failed, stopping here");
                break;
            }
        }
    }
    inner.queued_until_index = last_success;
    store.update_cursor(run_id, inner.cursor, inner.queued_until_index).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use shuffle_remote::{PlaybackObservation, RemoteError};
    use shuffle_store::{RunStore, Store};

    use super::*;
    use crate::registry::SessionRegistry;

    #[derive(Default)]
    struct FakeState {
        devices: Vec<DeviceInfo>,
        playback_queue: VecDeque<Option<PlaybackObservation>>,
        play_calls: Vec<String>,
        enqueue_calls: Vec<String>,
    }

    struct FakeRemoteClient {
        state: StdMutex<FakeState>,
    }

    impl FakeRemoteClient {
        fn new(devices: Vec<DeviceInfo>) -> Self {
            Self {
                state: StdMutex::new(FakeState {
                    devices,
                    ..Default::default()
                }),
            }
        }

        fn push_observation(&self, obs: Option<PlaybackObservation>) {
            self.state.lock().unwrap().playback_queue.push_back(obs);
        }

        fn enqueue_calls(&self) -> Vec<String> {
            self.state.lock().unwrap().enqueue_calls.clone()
        }

        fn play_calls(&self) -> Vec<String> {
            self.state.lock().unwrap().play_calls.clone()
        }
    }

    #[async_trait]
    impl RemoteClient for FakeRemoteClient {
        async fn list_devices(&self, _user_id: i64) -> shuffle_remote::Result<Vec<DeviceInfo>> {
            Ok(self.state.lock().unwrap().devices.clone())
        }

        async fn get_playback(&self, _user_id: i64) -> shuffle_remote::Result<Option<PlaybackObservation>> {
            Ok(self.state.lock().unwrap().playback_queue.pop_front().flatten())
        }

        async fn play(&self, _user_id: i64, uris: &[String], _device_id: Option<&str>) -> shuffle_remote::Result<()> {
            if let Some(uri) = uris.first() {
                self.state.lock().unwrap().play_calls.push(uri.clone());
            }
            Ok(())
        }

        async fn enqueue(&self, _user_id: i64, uri: &str, _device_id: Option<&str>) -> shuffle_remote::Result<()> {
            self.state.lock().unwrap().enqueue_calls.push(uri.to_string());
            Ok(())
        }

        async fn pause(&self, _user_id: i64, _device_id: Option<&str>) -> shuffle_remote::Result<()> {
            Ok(())
        }
    }

    struct PremiumGatedClient;

    #[async_trait]
    impl RemoteClient for PremiumGatedClient {
        async fn list_devices(&self, _user_id: i64) -> shuffle_remote::Result<Vec<DeviceInfo>> {
            Ok(vec![])
        }

        async fn get_playback(&self, _user_id: i64) -> shuffle_remote::Result<Option<PlaybackObservation>> {
            Err(RemoteError::PremiumRequired)
        }

        async fn play(&self, _user_id: i64, _uris: &[String], _device_id: Option<&str>) -> shuffle_remote::Result<()> {
            Err(RemoteError::PremiumRequired)
        }

        async fn enqueue(&self, _user_id: i64, _uri: &str, _device_id: Option<&str>) -> shuffle_remote::Result<()> {
            Ok(())
        }

        async fn pause(&self, _user_id: i64, _device_id: Option<&str>) -> shuffle_remote::Result<()> {
            Ok(())
        }
    }

    fn order(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("spotify:track:{i}")).collect()
    }

    fn active_device() -> DeviceInfo {
        DeviceInfo {
            id: Some("dev1".to_string()),
            name: "Kitchen Speaker".to_string(),
            is_active: true,
            device_type: "Speaker".to_string(),
        }
    }

    async fn test_store(name: &str) -> Arc<RunStore> {
        let path = std::env::temp_dir().join(format!("shuffle-controller-test-{name}.db"));
        let _ = std::fs::remove_file(&path);
        let store = Store::open(&path).await.unwrap();
        Arc::new(store.run_store())
    }

    fn playing_session(order: Vec<String>, cursor: usize) -> Arc<Session> {
        Arc::new(Session::new(1, 1, "pl1".to_string(), order, cursor))
    }

    async fn set_playing(session: &Session) {
        let mut inner = session.inner.lock().await;
        inner.state = ControllerState::Playing;
    }

    #[tokio::test]
    async fn natural_advance_updates_cursor() {
        let remote = FakeRemoteClient::new(vec![active_device()]);
        remote.push_observation(Some(PlaybackObservation {
            is_playing: true,
            track_uri: Some("spotify:track:1".to_string()),
            track_name: None,
            artist: None,
            album_art: None,
        }));
        let store = test_store("natural-advance").await;
        let session = playing_session(order(5), 0);
        set_playing(&session).await;

        let outcome = poll_once(&session, &remote, &store, 5).await;
        assert!(matches!(outcome, PollOutcome::Continue));
        let inner = session.inner.lock().await;
        assert_eq!(inner.cursor, 1);
        assert_eq!(inner.state, ControllerState::Playing);
    }

    #[tokio::test]
    async fn multi_skip_is_detected_within_window() {
        let remote = FakeRemoteClient::new(vec![active_device()]);
        remote.push_observation(Some(PlaybackObservation {
            is_playing: true,
            track_uri: Some("spotify:track:3".to_string()),
            track_name: None,
            artist: None,
            album_art: None,
        }));
        let store = test_store("multi-skip").await;
        let session = playing_session(order(6), 0);
        set_playing(&session).await;

        poll_once(&session, &remote, &store, 5).await;
        let inner = session.inner.lock().await;
        assert_eq!(inner.cursor, 3);
    }

    #[tokio::test]
    async fn foreign_track_triggers_hard_override() {
        let remote = FakeRemoteClient::new(vec![active_device()]);
        remote.push_observation(Some(PlaybackObservation {
            is_playing: true,
            track_uri: Some("spotify:track:not-in-order".to_string()),
            track_name: None,
            artist: None,
            album_art: None,
        }));
        let store = test_store("foreign-track").await;
        let session = playing_session(order(5), 2);
        set_playing(&session).await;

        poll_once(&session, &remote, &store, 5).await;
        let inner = session.inner.lock().await;
        assert_eq!(inner.cursor, 2);
        assert_eq!(inner.state, ControllerState::Playing);
        assert_eq!(remote.play_calls(), vec!["spotify:track:2".to_string()]);
    }

    #[tokio::test]
    async fn premium_required_stops_the_loop() {
        let remote = PremiumGatedClient;
        let store = test_store("premium-required").await;
        let session = playing_session(order(3), 0);
        set_playing(&session).await;

        let outcome = poll_once(&session, &remote, &store, 5).await;
        assert!(matches!(outcome, PollOutcome::Stop));
        let inner = session.inner.lock().await;
        assert_eq!(inner.state, ControllerState::Error);
        assert!(inner.error_message.is_some());
    }

    #[tokio::test]
    async fn fill_buffer_enqueues_up_to_buffer_size_without_redoing_sent_indices() {
        let remote = FakeRemoteClient::new(vec![active_device()]);
        let store = test_store("fill-buffer").await;
        let session = playing_session(order(6), 1);
        {
            let mut inner = session.inner.lock().await;
            inner.queued_until_index = 1;
            fill_buffer_impl(&remote, &store, session.run_id, session.user_id, &mut inner, 2)
                .await
                .unwrap();
        }
        assert_eq!(
            remote.enqueue_calls(),
            vec!["spotify:track:2".to_string(), "spotify:track:3".to_string()]
        );
    }

    #[tokio::test]
    async fn start_selects_active_device_and_fills_buffer() {
        let remote: Arc<dyn RemoteClient> = Arc::new(FakeRemoteClient::new(vec![active_device()]));
        let store = test_store("start-active-device").await;
        let registry = Arc::new(SessionRegistry::new());
        let controller = Controller::new(remote, store, registry, 2);

        let tracks: Vec<Track> = (0..4)
            .map(|i| Track {
                uri: format!("spotify:track:{i}"),
                name: format!("Track {i}"),
                artist: "Artist".to_string(),
                is_playable: true,
                is_local: false,
                track_type: "track".to_string(),
            })
            .collect();

        let status = controller.start(1, "pl1", tracks).await.unwrap();
        assert_eq!(status.state, ControllerState::Playing);
        assert_eq!(status.device_id, Some("dev1".to_string()));

        let again = controller.start(1, "pl1", vec![]).await.unwrap();
        assert_eq!(again.state, ControllerState::Playing);

        controller.stop(1, "pl1").await.unwrap();
    }

    #[tokio::test]
    async fn start_with_no_device_reports_no_device_state() {
        let remote: Arc<dyn RemoteClient> = Arc::new(FakeRemoteClient::new(vec![]));
        let store = test_store("start-no-device").await;
        let registry = Arc::new(SessionRegistry::new());
        let controller = Controller::new(remote, store, registry, 2);

        let tracks = vec![Track {
            uri: "spotify:track:only".to_string(),
            name: "Only".to_string(),
            artist: "Artist".to_string(),
            is_playable: true,
            is_local: false,
            track_type: "track".to_string(),
        }];
        let status = controller.start(1, "pl1", tracks).await.unwrap();
        assert_eq!(status.state, ControllerState::NoDevice);
    }
}
