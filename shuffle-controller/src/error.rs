use thiserror::Error;

/// Error kinds surfaced by user-initiated commands.
/// The reconciliation loop itself never returns these to a caller —
/// it recovers transient faults and transitions to `error` on
/// unrecoverable ones — but shares the same vocabulary internally.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("no valid session; please log in again")]
    AuthExpired,

    #[error("this operation requires Spotify Premium")]
    PremiumRequired,

    #[error("device or resource not found")]
    NotFound,

    #[error("no active session for this playlist")]
    NoSession,

    #[error("playlist has no playable tracks")]
    InvalidRun,

    #[error("upstream service is temporarily unavailable")]
    TransientRemote,

    #[error(transparent)]
    Store(#[from] shuffle_store::StoreError),
}

impl From<shuffle_remote::RemoteError> for ControllerError {
    fn from(err: shuffle_remote::RemoteError) -> Self {
        use shuffle_remote::RemoteError;
        match err {
            RemoteError::AuthExpired => ControllerError::AuthExpired,
            RemoteError::PremiumRequired => ControllerError::PremiumRequired,
            RemoteError::NotFound => ControllerError::NotFound,
            RemoteError::RateLimited
            | RemoteError::TransientRemote(_)
            | RemoteError::ClientError { .. }
            | RemoteError::Http(_)
            | RemoteError::Decode(_) => ControllerError::TransientRemote,
        }
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;
