//! Error Kind - Classification of errors
//!
//! Defines the [`ErrorKind`] enum shared by every crate in the workspace.
//! Each kind maps to an HTTP status code used by the presentation layer.

use serde::Serialize;

/// エラー種別の列挙体
///
/// システム全体で統一的に扱うエラー分類を定義します。
/// HTTP 層はこの種別をそのままレスポンスの `error` フィールドに出力します。
///
/// ## Examples
/// ```rust
/// use kernel::error::kind::ErrorKind;
///
/// let kind = ErrorKind::NotFound;
/// assert_eq!(kind.status_code(), 404);
/// assert_eq!(kind.as_str(), "NotFound");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// 設定エラー（未知のデータベース種別、不正な設定ファイル）
    Config,
    /// 指定した識別子に一致する行が存在しない
    NotFound,
    /// 一意制約違反（ユーザー名、メールアドレス、ロール名、結合ペア）
    Conflict,
    /// その他の永続化層エラー（接続断、分類できない制約違反）
    Database,
    /// HMAC 不一致、認証付き復号の失敗、不正な base64
    Crypto,
    /// パスワード不一致、無効ユーザー、ロックされたアカウント
    Auth,
    /// 破損または期限切れのセッションデータ
    Session,
    /// リクエストスコープのキャンセルを検知
    Cancelled,
    /// 不変条件違反（バグを示す）
    Internal,
}

impl ErrorKind {
    /// HTTP ステータスコードを取得
    ///
    /// `Cancelled` はクライアント切断を表す非標準の 499 を返します。
    ///
    /// ## Examples
    /// ```rust
    /// use kernel::error::kind::ErrorKind;
    /// assert_eq!(ErrorKind::Auth.status_code(), 401);
    /// assert_eq!(ErrorKind::Conflict.status_code(), 409);
    /// ```
    #[inline]
    pub const fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Config => 500,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Database => 500,
            ErrorKind::Crypto => 400,
            ErrorKind::Auth => 401,
            ErrorKind::Session => 401,
            ErrorKind::Cancelled => 499,
            ErrorKind::Internal => 500,
        }
    }

    /// 外部に出力する種別名を取得
    ///
    /// ## Examples
    /// ```rust
    /// use kernel::error::kind::ErrorKind;
    /// assert_eq!(ErrorKind::Crypto.as_str(), "Crypto");
    /// ```
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "Config",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Database => "Database",
            ErrorKind::Crypto => "Crypto",
            ErrorKind::Auth => "Auth",
            ErrorKind::Session => "Session",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Internal => "Internal",
        }
    }

    /// サーバー側のエラーかどうかを判定
    ///
    /// 5xx系のエラーは `true` を返します。
    /// これらのエラーはログに記録すべきです。
    #[inline]
    pub const fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// ハンドラ内で回復可能な種別かどうか
    ///
    /// `Session` だけはセッションを破棄してログアウト扱いで処理を継続します。
    #[inline]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, ErrorKind::Session)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ErrorKind::Config.status_code(), 500);
        assert_eq!(ErrorKind::NotFound.status_code(), 404);
        assert_eq!(ErrorKind::Conflict.status_code(), 409);
        assert_eq!(ErrorKind::Database.status_code(), 500);
        assert_eq!(ErrorKind::Crypto.status_code(), 400);
        assert_eq!(ErrorKind::Auth.status_code(), 401);
        assert_eq!(ErrorKind::Session.status_code(), 401);
        assert_eq!(ErrorKind::Cancelled.status_code(), 499);
        assert_eq!(ErrorKind::Internal.status_code(), 500);
    }

    #[test]
    fn test_as_str_matches_display() {
        for kind in [
            ErrorKind::Config,
            ErrorKind::NotFound,
            ErrorKind::Conflict,
            ErrorKind::Database,
            ErrorKind::Crypto,
            ErrorKind::Auth,
            ErrorKind::Session,
            ErrorKind::Cancelled,
            ErrorKind::Internal,
        ] {
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }

    #[test]
    fn test_is_server_error() {
        assert!(!ErrorKind::Auth.is_server_error());
        assert!(!ErrorKind::NotFound.is_server_error());
        assert!(ErrorKind::Database.is_server_error());
        assert!(ErrorKind::Internal.is_server_error());
    }

    #[test]
    fn test_only_session_is_recoverable() {
        assert!(ErrorKind::Session.is_recoverable());
        assert!(!ErrorKind::Auth.is_recoverable());
        assert!(!ErrorKind::Cancelled.is_recoverable());
    }
}
