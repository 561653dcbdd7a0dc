//! `ApiError`: the HTTP-facing error type. Wraps every lower crate's
//! error via `#[from]` and maps each kind to the status named in the
//! command table.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use shuffle_controller::ControllerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no valid session; please log in again")]
    Unauthorized,

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Core(#[from] shuffle_core::CoreError),

    #[error("invalid request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Controller(err) => match err {
                ControllerError::AuthExpired => StatusCode::UNAUTHORIZED,
                ControllerError::PremiumRequired => StatusCode::FORBIDDEN,
                ControllerError::NotFound => StatusCode::NOT_FOUND,
                ControllerError::NoSession => StatusCode::NOT_FOUND,
                ControllerError::InvalidRun => StatusCode::BAD_REQUEST,
                ControllerError::TransientRemote => StatusCode::BAD_GATEWAY,
                ControllerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
