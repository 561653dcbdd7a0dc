//! Pure domain layer: track filtering, the Fisher-Yates shuffle engine
//! with its similarity guard, the `Run` type, and run export/import.
//!
//! Nothing in this crate performs I/O; every function here is
//! deterministic given its inputs (and, where randomness is involved,
//! given an explicit `rand::Rng`).

pub mod error;
pub mod export;
pub mod run;
pub mod shuffle;
pub mod track;

pub use error::{CoreError, Result};
pub use export::{export_run, import_run, ExportPayload};
pub use run::{Mode, Run, RunStatus};
pub use shuffle::{dedup_by_uri, filter_valid_tracks, fisher_yates_shuffle, prepare_shuffled_run};
pub use track::{SkipReason, SkippedTrack, Track};
