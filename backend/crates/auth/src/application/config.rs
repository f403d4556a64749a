//! Application Configuration
//!
//! Configuration for the Auth application layer.

use std::path::PathBuf;
use std::time::Duration;

use platform::cookie::CookieConfig;

/// Re-export SameSite for callers configuring cookies
pub use axum_extra::extract::cookie::SameSite;

/// Name of the cookie carrying the signed session id
pub const LOGIN_COOKIE: &str = "login";
/// Name of the cookie carrying the signed user id
pub const USER_COOKIE: &str = "user";

/// Auth application configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Directory holding one file per session
    pub session_dir: PathBuf,
    /// Absolute server-side validity of a session (1 week)
    pub session_window: Duration,
    /// How often expired session files are reaped
    pub session_clean_interval: Duration,
    /// Attributes of the `login` and `user` cookies (24 hour max-age)
    pub cookie: CookieConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_dir: PathBuf::from("sessions"),
            session_window: Duration::from_secs(168 * 3600), // 1 week
            session_clean_interval: Duration::from_secs(3600),
            cookie: CookieConfig {
                secure: true,
                same_site: SameSite::Lax,
                ..CookieConfig::default()
            },
        }
    }
}

impl AuthConfig {
    /// Create config for development (insecure cookie)
    pub fn development() -> Self {
        let mut config = Self::default();
        config.cookie.secure = false;
        config
    }

    pub fn with_session_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.session_dir = dir.into();
        self
    }

    /// Session window as a chrono duration for timestamp arithmetic
    pub fn session_window_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.session_window).unwrap_or(chrono::Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.session_window_chrono(), chrono::Duration::hours(168));
        assert_eq!(config.cookie.max_age_secs, Some(24 * 3600));
        assert!(config.cookie.http_only);
        assert!(config.cookie.secure);
        assert!(!AuthConfig::development().cookie.secure);
    }
}
