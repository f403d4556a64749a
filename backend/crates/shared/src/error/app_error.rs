//! Application Error - Error value crossing crate boundaries
//!
//! Crate-level errors (`AuthError`, configuration failures) are converted
//! into [`AppError`] at the edge: the binary reports it at startup and the
//! HTTP layer renders it as the response envelope.

use std::borrow::Cow;
use std::error::Error;
use std::fmt;

use super::kind::ErrorKind;

/// 境界を越えるエラー
///
/// 種別・利用者向けメッセージ・推奨アクション・元エラーを保持します。
///
/// ## Examples
/// ```rust
/// use kernel::error::{app_error::AppError, kind::ErrorKind};
///
/// let err = AppError::config("Unknown database type 7")
///     .with_action("Use 0 (None) or 1 (MySQL)");
/// assert_eq!(err.kind(), ErrorKind::Config);
/// assert_eq!(err.action(), Some("Use 0 (None) or 1 (MySQL)"));
/// ```
pub struct AppError {
    kind: ErrorKind,
    /// 利用者向けメッセージ（サーバーエラーでは外部に出さない）
    message: Cow<'static, str>,
    /// 利用者が次に取るべき操作
    action: Option<Cow<'static, str>>,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

/// `Result<T, AppError>`
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
            action: None,
            source: None,
        }
    }

    /// 設定ファイルやフラグの不備（起動失敗）
    pub fn config(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn internal(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn with_action(mut self, action: impl Into<Cow<'static, str>>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// 詳細を外部に出してよいか（クライアント起因のエラーのみ）
    pub fn is_server_error(&self) -> bool {
        self.kind.is_server_error()
    }
}

impl fmt::Debug for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("action", &self.action)
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(action) = &self.action {
            write!(f, " ({})", action)?;
        }
        Ok(())
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let err = AppError::config("Unknown database type 7");
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.message(), "Unknown database type 7");
        assert!(err.action().is_none());
        assert!(err.is_server_error());
    }

    #[test]
    fn test_display_includes_action() {
        let err = AppError::new(ErrorKind::Auth, "Invalid credentials");
        assert_eq!(err.to_string(), "[Auth] Invalid credentials");

        let err = err.with_action("Check your username and password");
        assert_eq!(
            err.to_string(),
            "[Auth] Invalid credentials (Check your username and password)"
        );
    }

    #[test]
    fn test_source_is_kept() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "config.json");
        let err = AppError::config("Failed to read config file").with_source(io_err);
        assert!(err.source().is_some());
    }
}
