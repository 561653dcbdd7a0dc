//! Run export/import. Exported JSON carries no secrets; import strips
//! any token-like field regardless of where it appears in the payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::run::{Mode, Run, RunStatus};

/// Field names stripped from import payloads no matter where they
/// appear in the object graph.
const TOKEN_LIKE_FIELDS: &[&str] = &["access_token", "refresh_token", "token_data", "secret_key"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub playlist_id: String,
    pub mode: Mode,
    pub shuffled_order: Vec<String>,
    pub cursor: usize,
    pub status: RunStatus,
    pub exported_at: DateTime<Utc>,
}

/// Build the no-secrets export payload for a run.
#[must_use]
pub fn export_run(run: &Run) -> ExportPayload {
    ExportPayload {
        playlist_id: run.playlist_id.clone(),
        mode: run.mode,
        shuffled_order: run.order.clone(),
        cursor: run.cursor,
        status: run.status,
        exported_at: Utc::now(),
    }
}

/// Recursively remove any token-like key from a JSON value, in place.
fn strip_token_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for field in TOKEN_LIKE_FIELDS {
                map.remove(*field);
            }
            for (_, v) in map.iter_mut() {
                strip_token_fields(v);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_token_fields(item);
            }
        }
        _ => {}
    }
}

/// Parse an import payload, stripping token-like fields before
/// deserializing into [`ExportPayload`]. Round-trips with
/// [`export_run`] on the whitelisted fields.
pub fn import_run(json: &str) -> Result<ExportPayload> {
    let mut value: Value = serde_json::from_str(json)?;
    strip_token_fields(&mut value);
    let payload: ExportPayload = serde_json::from_value(value).map_err(|e| {
        CoreError::InvalidExport {
            reason: e.to_string(),
        }
    })?;
    Ok(payload)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_run() -> Run {
        Run {
            id: 1,
            user_id: 1,
            playlist_id: "pl1".to_string(),
            mode: Mode::Controller,
            order: vec!["spotify:track:1".to_string(), "spotify:track:2".to_string()],
            cursor: 1,
            queued_until_index: 1,
            status: RunStatus::Active,
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
            updated_at: Utc.timestamp_opt(0, 0).unwrap(),
        }
    }

    #[test]
    fn export_then_import_round_trips_whitelisted_fields() {
        let run = sample_run();
        let exported = export_run(&run);
        let json = serde_json::to_string(&exported).unwrap();
        let imported = import_run(&json).unwrap();
        assert_eq!(imported.playlist_id, exported.playlist_id);
        assert_eq!(imported.mode, exported.mode);
        assert_eq!(imported.shuffled_order, exported.shuffled_order);
        assert_eq!(imported.cursor, exported.cursor);
        assert_eq!(imported.status, exported.status);
    }

    #[test]
    fn import_strips_top_level_token_fields() {
        let json = serde_json::json!({
            "playlist_id": "pl1",
            "mode": "controller",
            "shuffled_order": ["spotify:track:1"],
            "cursor": 0,
            "status": "active",
            "exported_at": "2024-01-01T00:00:00Z",
            "access_token": "should-be-dropped",
        })
        .to_string();
        // access_token is not a field of ExportPayload, so serde simply
        // ignores it; the meaningful assertion is the nested case below.
        assert!(import_run(&json).is_ok());
    }

    #[test]
    fn import_strips_nested_token_fields_regardless_of_position() {
        let mut value = serde_json::json!({
            "playlist_id": "pl1",
            "mode": "controller",
            "shuffled_order": ["spotify:track:1"],
            "cursor": 0,
            "status": "active",
            "exported_at": "2024-01-01T00:00:00Z",
            "nested": {
                "refresh_token": "secret",
                "token_data": {"secret_key": "also-secret"},
            },
        });
        let before = value.to_string();
        super::strip_token_fields(&mut value);
        let after = value.to_string();
        assert!(before.contains("refresh_token"));
        assert!(!after.contains("refresh_token"));
        assert!(!after.contains("secret_key"));
    }
}
