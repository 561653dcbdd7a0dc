use thiserror::Error;

/// Errors surfaced by the pure domain layer: shuffling, filtering, and
/// run export/import. Remote and storage failures live in their own
/// crates and are mapped into [`crate::ControllerError`]-style enums
/// further up the stack, not here.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid run export payload: {reason}")]
    InvalidExport { reason: String },

    #[error("failed to parse run export JSON: {0}")]
    ExportParse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
