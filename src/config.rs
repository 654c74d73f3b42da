//! Server configuration parsed from environment variables.

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 30;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required env var: {var}")]
    Missing { var: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    /// Insert the built-in component library at startup when none exists.
    pub seed_components: bool,
    /// Expose `POST /api/auth/dev-login`.
    pub dev_login_enabled: bool,
    pub cookie_secure: bool,
    pub session_ttl_hours: i64,
}

impl ServerConfig {
    /// Build typed server config from the process environment.
    ///
    /// Required:
    /// - `DATABASE_URL`
    ///
    /// Optional:
    /// - `PORT`: default 3000
    /// - `DB_MAX_CONNECTIONS`: default 5
    /// - `SEED_COMPONENTS`: default true
    /// - `DEV_LOGIN_ENABLED`: default false
    /// - `COOKIE_SECURE`: default false
    /// - `SESSION_TTL_HOURS`: default 720
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `DATABASE_URL` is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` but reads values through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `DATABASE_URL` is absent or blank.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing { var: "DATABASE_URL" })?;

        Ok(Self {
            database_url,
            port: env_parse(&lookup, "PORT", DEFAULT_PORT),
            db_max_connections: env_parse(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            seed_components: env_bool(&lookup, "SEED_COMPONENTS", true),
            dev_login_enabled: env_bool(&lookup, "DEV_LOGIN_ENABLED", false),
            cookie_secure: env_bool(&lookup, "COOKIE_SECURE", false),
            session_ttl_hours: env_parse(&lookup, "SESSION_TTL_HOURS", DEFAULT_SESSION_TTL_HOURS).max(1),
        })
    }
}

fn env_parse<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
