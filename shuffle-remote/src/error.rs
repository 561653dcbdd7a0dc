use thiserror::Error;

/// Errors surfaced by the Remote Client. Retryable failures are
/// resolved internally and never reach callers as these variants unless
/// retries are exhausted.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("no valid access token and refresh failed")]
    AuthExpired,

    #[error("operation requires Spotify Premium or a missing scope")]
    PremiumRequired,

    #[error("resource not found")]
    NotFound,

    #[error("rate limited after exhausting retries")]
    RateLimited,

    #[error("transient upstream failure after exhausting retries: {0}")]
    TransientRemote(String),

    #[error("client error {status}: {body}")]
    ClientError { status: u16, body: String },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RemoteError>;
