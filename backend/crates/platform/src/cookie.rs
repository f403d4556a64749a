//! Cookie Management Infrastructure
//!
//! Cookie attribute configuration and HMAC signing of cookie values.

use axum_extra::extract::cookie::{Cookie, SameSite};
use zeroize::Zeroizing;

use crate::crypto::{compute_hmac, random_bytes, verify_hmac};

/// Minimum length of a process-random signing key
pub const MIN_SIGNING_KEY_LEN: usize = 128;

/// Cookie configuration
#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
    pub path: String,
    pub max_age_secs: Option<i64>,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            secure: false,
            http_only: true,
            same_site: SameSite::Lax,
            path: "/".to_string(),
            max_age_secs: Some(24 * 3600),
        }
    }
}

impl CookieConfig {
    /// Build a cookie carrying `value`
    pub fn build(&self, name: &str, value: String) -> Cookie<'static> {
        let mut cookie = Cookie::build((name.to_string(), value))
            .path(self.path.clone())
            .http_only(self.http_only)
            .secure(self.secure)
            .same_site(self.same_site);

        if let Some(max_age) = self.max_age_secs {
            cookie = cookie.max_age(time::Duration::seconds(max_age));
        }

        cookie.build()
    }

    /// Build a removal cookie (empty value, already expired)
    pub fn build_removal(&self, name: &str) -> Cookie<'static> {
        let mut cookie = Cookie::build((name.to_string(), String::new()))
            .path(self.path.clone())
            .http_only(self.http_only)
            .build();
        cookie.make_removal();
        cookie
    }
}

/// Signs cookie values as `value.tag` with HMAC-SHA256
///
/// The key lives only in process memory; a restart invalidates every cookie.
pub struct CookieSigner {
    key: Zeroizing<Vec<u8>>,
}

impl CookieSigner {
    /// Create a signer with a fresh random key of [`MIN_SIGNING_KEY_LEN`] bytes
    pub fn generate() -> Self {
        Self {
            key: Zeroizing::new(random_bytes(MIN_SIGNING_KEY_LEN)),
        }
    }

    /// Sign a value
    pub fn sign(&self, value: &str) -> String {
        format!("{}.{}", value, compute_hmac(value.as_bytes(), &self.key))
    }

    /// Return the original value if the signature is valid
    pub fn unsign<'a>(&self, signed: &'a str) -> Option<&'a str> {
        let (value, tag) = signed.rsplit_once('.')?;
        verify_hmac(value.as_bytes(), tag, &self.key).then_some(value)
    }
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner")
            .field("key", &"[REDACTED]")
            .finish()
    }
}
