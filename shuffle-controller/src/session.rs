//! Session: the in-memory half of a live controller run.

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Idle,
    Starting,
    NoDevice,
    Playing,
    Overriding,
    Advancing,
    Completed,
    Error,
}

/// The live, in-process half of a controller run. Exclusively owns its
/// reconciliation task; the Run Store is the sole durable writer of
/// `cursor`/`queued_until_index`, always driven by this struct.
pub struct Session {
    pub run_id: i64,
    pub user_id: i64,
    pub playlist_id: String,
    /// Guards every session-mutating operation (`start`'s post-create
    /// steps, `next`, `stop`, `refresh`, each poll iteration) so user
    /// commands never run concurrently with the poll body.
    pub inner: Mutex<SessionInner>,
}

pub struct SessionInner {
    pub order: Vec<String>,
    pub cursor: usize,
    pub queued_until_index: usize,
    pub state: ControllerState,
    pub device_id: Option<String>,
    pub error_message: Option<String>,
    pub current_track_uri: Option<String>,
    pub current_track_name: Option<String>,
    pub current_artist: Option<String>,
    pub current_album_art: Option<String>,
    pub poll_task: Option<(JoinHandle<()>, CancellationToken)>,
}

impl Session {
    #[must_use]
    pub fn new(run_id: i64, user_id: i64, playlist_id: String, order: Vec<String>, cursor: usize) -> Self {
        Self {
            run_id,
            user_id,
            playlist_id,
            inner: Mutex::new(SessionInner {
                order,
                cursor,
                queued_until_index: cursor,
                state: ControllerState::Idle,
                device_id: None,
                error_message: None,
                current_track_uri: None,
                current_track_name: None,
                current_artist: None,
                current_album_art: None,
                poll_task: None,
            }),
        }
    }
}

/// The stable status snapshot returned by every command.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: ControllerState,
    pub cursor: usize,
    pub total_tracks: usize,
    pub current_track_uri: Option<String>,
    pub current_track_name: Option<String>,
    pub current_artist: Option<String>,
    pub current_album_art: Option<String>,
    pub error_message: Option<String>,
    pub device_id: Option<String>,
}

impl SessionInner {
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            cursor: self.cursor,
            total_tracks: self.order.len(),
            current_track_uri: self.current_track_uri.clone(),
            current_track_name: self.current_track_name.clone(),
            current_artist: self.current_artist.clone(),
            current_album_art: self.current_album_art.clone(),
            error_message: self.error_message.clone(),
            device_id: self.device_id.clone(),
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.order.len()
    }
}
