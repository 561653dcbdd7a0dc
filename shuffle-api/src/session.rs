//! Session identity: a signed cookie carrying the local user id, set on
//! successful `/callback`. Handlers that require it use [`AuthedUser`]
//! as an extractor; a missing or invalid cookie surfaces as 401,
//! matching the command table.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::SignedCookieJar;

use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_COOKIE_NAME: &str = "shuffle_session";

/// Build the signed cookie jar mutation that logs a user in. Returned
/// from the `/callback` handler alongside a redirect; axum applies the
/// `Set-Cookie` header via `SignedCookieJar`'s `IntoResponseParts` impl.
#[must_use]
pub fn login_cookie(state: &AppState, user_id: i64) -> SignedCookieJar {
    let cookie = Cookie::build((SESSION_COOKIE_NAME, user_id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    SignedCookieJar::new(state.cookie_key.clone()).add(cookie)
}

/// The authenticated local user id, extracted from the signed session
/// cookie. Rejects with 401 when the cookie is absent, unsigned, or
/// does not parse as an id.
pub struct AuthedUser(pub i64);

impl FromRequestParts<AppState> for AuthedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = SignedCookieJar::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Unauthorized)?;
        let user_id = jar
            .get(SESSION_COOKIE_NAME)
            .and_then(|cookie| cookie.value().parse::<i64>().ok())
            .ok_or(ApiError::Unauthorized)?;
        Ok(Self(user_id))
    }
}
