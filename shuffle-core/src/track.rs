//! Track shape consumed by the shuffle engine, and why a track might be
//! excluded from a run's order.

use serde::{Deserialize, Serialize};

/// A single playlist entry as reported by the streaming service, prior
/// to filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub uri: String,
    pub name: String,
    pub artist: String,
    #[serde(default = "default_true")]
    pub is_playable: bool,
    #[serde(default)]
    pub is_local: bool,
    #[serde(default = "default_track_type")]
    pub track_type: String,
}

fn default_true() -> bool {
    true
}

fn default_track_type() -> String {
    "track".to_string()
}

impl Track {
    /// A track is valid iff it is playable, not a local file, reports
    /// `track_type == "track"`, and carries a `spotify:track:*` URI.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_playable
            && !self.is_local
            && self.track_type == "track"
            && self.uri.starts_with("spotify:track:")
    }
}

/// Why a track was excluded from the final shuffled order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Local,
    Episode,
    Unavailable,
    Duplicate,
}

/// A track dropped during filtering or deduplication, kept for the
/// informational skipped-tracks log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTrack {
    pub uri: String,
    pub reason: SkipReason,
}

impl Track {
    /// Classify why this track is invalid. Only meaningful when
    /// [`Track::is_valid`] is `false`.
    #[must_use]
    pub fn skip_reason(&self) -> Option<SkipReason> {
        if self.is_local {
            Some(SkipReason::Local)
        } else if self.track_type != "track" {
            Some(SkipReason::Episode)
        } else if !self.is_playable || !self.uri.starts_with("spotify:track:") {
            Some(SkipReason::Unavailable)
        } else {
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn track(uri: &str) -> Track {
        Track {
            uri: uri.to_string(),
            name: "name".to_string(),
            artist: "artist".to_string(),
            is_playable: true,
            is_local: false,
            track_type: "track".to_string(),
        }
    }

    #[test]
    fn valid_track_passes() {
        let t = track("spotify:track:abc");
        assert!(t.is_valid());
        assert_eq!(t.skip_reason(), None);
    }

    #[test]
    fn local_track_is_invalid() {
        let mut t = track("spotify:track:abc");
        t.is_local = true;
        assert!(!t.is_valid());
        assert_eq!(t.skip_reason(), Some(SkipReason::Local));
    }

    #[test]
    fn episode_is_invalid() {
        let mut t = track("spotify:episode:abc");
        t.track_type = "episode".to_string();
        assert!(!t.is_valid());
        assert_eq!(t.skip_reason(), Some(SkipReason::Episode));
    }

    #[test]
    fn unplayable_is_invalid() {
        let mut t = track("spotify:track:abc");
        t.is_playable = false;
        assert!(!t.is_valid());
        assert_eq!(t.skip_reason(), Some(SkipReason::Unavailable));
    }

    #[test]
    fn non_track_uri_is_invalid() {
        let t = track("spotify:local:abc");
        assert!(!t.is_valid());
        assert_eq!(t.skip_reason(), Some(SkipReason::Unavailable));
    }
}
