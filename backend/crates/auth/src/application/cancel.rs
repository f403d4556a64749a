//! Request Cancellation
//!
//! Every request runs under a child of the process shutdown token. I/O
//! awaited through [`cancellable`] stops early with `Cancelled` once that
//! token fires.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{AuthError, AuthResult};

/// Await `fut` unless `token` is cancelled first
pub async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(AuthError::Cancelled),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_when_not_cancelled() {
        let token = CancellationToken::new();
        let result = cancellable(&token, async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_cancelled_token_wins() {
        let token = CancellationToken::new();
        token.cancel();
        let result: AuthResult<()> = cancellable(&token, std::future::pending()).await;
        assert!(matches!(result, Err(AuthError::Cancelled)));
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_child() {
        let root = CancellationToken::new();
        let child = root.child_token();
        root.cancel();
        let result: AuthResult<()> = cancellable(&child, std::future::pending()).await;
        assert!(matches!(result, Err(AuthError::Cancelled)));
    }
}
