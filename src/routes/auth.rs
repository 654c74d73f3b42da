//! Auth routes: development login, current user, logout.
//!
//! Browsers carry the session in the `session_token` cookie; the CLI and the
//! builder client send `Authorization: Bearer <token>`. Both resolve to the
//! same session row.

use axum::extract::{FromRef, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use time::Duration;

use crate::error::ErrorCode;
use crate::model::{SessionResponse, User};
use crate::routes::error::ApiError;
use crate::services::session;
use crate::state::AppState;

pub(crate) const COOKIE_NAME: &str = "session_token";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authentication required")]
    Unauthorized,
    #[error("dev login is disabled")]
    DevLoginDisabled,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for AuthError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "E_UNAUTHORIZED",
            Self::DevLoginDisabled => "E_DEV_LOGIN_DISABLED",
            Self::InvalidEmail => "E_INVALID_EMAIL",
            Self::Database(_) => "E_DATABASE",
        }
    }
}

pub(crate) fn auth_error_to_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
        AuthError::DevLoginDisabled => StatusCode::NOT_FOUND,
        AuthError::InvalidEmail => StatusCode::BAD_REQUEST,
        AuthError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::new(auth_error_to_status(&err), &err)
    }
}

/// Session token from the `Authorization` header, falling back to the cookie.
pub(crate) fn request_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_owned());
    }
    let jar = CookieJar::from_headers(headers);
    jar.get(COOKIE_NAME)
        .map(Cookie::value)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
}

fn session_cookie(token: String, secure: bool, max_age: Duration) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(max_age)
        .build()
}

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated user. Use as a handler parameter to require a session.
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = request_token(&parts.headers).ok_or(AuthError::Unauthorized)?;
        let app_state = AppState::from_ref(state);
        let user = session::validate_session(&app_state.pool, &token)
            .await
            .map_err(AuthError::Database)?
            .ok_or(AuthError::Unauthorized)?;
        Ok(Self { user, token })
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct DevLoginBody {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// `POST /api/auth/dev-login` — upsert a user by email and start a session.
pub async fn dev_login(
    State(state): State<AppState>,
    Json(body): Json<DevLoginBody>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.config.dev_login_enabled {
        return Err(AuthError::DevLoginDisabled.into());
    }
    let email = body.email.trim().to_ascii_lowercase();
    if !email.contains('@') || email.len() < 3 {
        return Err(AuthError::InvalidEmail.into());
    }
    let name = body
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map_or_else(|| session::default_name_for_email(&email), str::to_owned);

    let user = session::upsert_user(&state.pool, &email, &name)
        .await
        .map_err(AuthError::Database)?;
    let token = session::create_session(&state.pool, user.id, state.config.session_ttl_hours)
        .await
        .map_err(AuthError::Database)?;
    tracing::info!(user_id = %user.id, "dev login");

    let cookie = session_cookie(token.clone(), state.config.cookie_secure, Duration::hours(state.config.session_ttl_hours));
    let jar = CookieJar::new().add(cookie);
    Ok((jar, Json(SessionResponse { token, user })))
}

/// `GET /api/auth/me` — return current user.
pub async fn me(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}

/// `POST /api/auth/logout` — delete session, clear cookie.
pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> Result<impl IntoResponse, ApiError> {
    session::delete_session(&state.pool, &auth.token)
        .await
        .map_err(AuthError::Database)?;

    let cookie = session_cookie(String::new(), state.config.cookie_secure, Duration::ZERO);
    let jar = CookieJar::new().add(cookie);
    Ok((jar, StatusCode::NO_CONTENT))
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
