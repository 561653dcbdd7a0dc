//! Wire shapes for the subset of the Spotify Web API this crate calls.
//! Kept deliberately small and hand-rolled (rather than depending on
//! `rspotify`'s model crate) so the Remote Client controls exactly
//! which fields it parses and tolerates the rest.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    pub id: Option<String>,
    pub name: String,
    pub is_active: bool,
    #[serde(rename = "type")]
    pub device_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevicesResponse {
    #[serde(default)]
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackItem {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub album: Option<AlbumRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumRef {
    #[serde(default)]
    pub images: Vec<Image>,
}

impl TrackItem {
    #[must_use]
    pub fn first_artist_name(&self) -> String {
        self.artists.first().map_or_else(String::new, |a| a.name.clone())
    }

    #[must_use]
    pub fn first_album_art_url(&self) -> Option<String> {
        self.album.as_ref().and_then(|a| a.images.first()).map(|i| i.url.clone())
    }
}

/// `GET /me/player` response, when present (204 maps to `None` at the
/// call site).
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackSnapshot {
    pub is_playing: bool,
    pub item: Option<TrackItem>,
}

/// One page of `GET /playlists/{id}/tracks`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistTracksPage {
    pub items: Vec<PlaylistTrackEntry>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistTrackEntry {
    #[serde(default)]
    pub is_local: bool,
    pub track: Option<PlaylistTrackObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistTrackObject {
    pub uri: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub is_playable: Option<bool>,
    #[serde(rename = "type", default = "default_track_type")]
    pub item_type: String,
}

fn default_track_type() -> String {
    "track".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayRequestBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uris: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_ms: Option<u32>,
}
