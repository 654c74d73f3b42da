//! Session tokens and user lookup.
//!
//! ARCHITECTURE
//! ============
//! HTTP auth uses opaque random session tokens stored in Postgres with an
//! expiry. The token travels as the `session_token` cookie for browsers or as
//! a bearer token for the CLI and builder client.

use std::fmt::Write;

use rand::Rng;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::model::User;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// Display name used when a login supplies only an email address.
#[must_use]
pub fn default_name_for_email(email: &str) -> String {
    email.split('@').next().filter(|local| !local.is_empty()).unwrap_or(email).to_owned()
}

/// Insert a user by email, or update the stored name of an existing one.
///
/// # Errors
///
/// Returns a database error if the upsert fails.
pub async fn upsert_user(pool: &PgPool, email: &str, name: &str) -> Result<User, sqlx::Error> {
    let row = sqlx::query(
        "INSERT INTO users (id, name, email) VALUES ($1, $2, $3)
         ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name
         RETURNING id, name, email",
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .fetch_one(pool)
    .await?;

    Ok(User { id: row.get("id"), name: row.get("name"), email: row.get("email") })
}

/// Create a session for the given user that expires after `ttl_hours`.
///
/// # Errors
///
/// Returns a database error if the insert fails.
pub async fn create_session(pool: &PgPool, user_id: Uuid, ttl_hours: i64) -> Result<String, sqlx::Error> {
    let token = generate_token();
    sqlx::query(
        "INSERT INTO sessions (token, user_id, expires_at)
         VALUES ($1, $2, now() + make_interval(hours => $3::int))",
    )
    .bind(&token)
    .bind(user_id)
    .bind(ttl_hours)
    .execute(pool)
    .await?;
    Ok(token)
}

/// Validate a session token and return the associated user.
///
/// # Errors
///
/// Returns a database error if the lookup fails.
pub async fn validate_session(pool: &PgPool, token: &str) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT u.id, u.name, u.email
         FROM sessions s
         JOIN users u ON u.id = s.user_id
         WHERE s.token = $1 AND s.expires_at > now()",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| User { id: r.get("id"), name: r.get("name"), email: r.get("email") }))
}

/// Delete a session by token.
///
/// # Errors
///
/// Returns a database error if the delete fails.
pub async fn delete_session(pool: &PgPool, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE token = $1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
