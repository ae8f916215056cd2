use crate::error::{DeletionError, DeletionResult};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Run `fut` unless `token` fires first
pub(crate) async fn until_cancelled<F: Future>(
    token: &CancellationToken,
    fut: F,
) -> DeletionResult<F::Output> {
    tokio::select! {
        biased;
        () = token.cancelled() => Err(DeletionError::Cancelled),
        out = fut => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_token_wins() {
        let token = CancellationToken::new();
        token.cancel();
        let result = until_cancelled(&token, async { 1 }).await;
        assert!(matches!(result, Err(DeletionError::Cancelled)));
    }

    #[tokio::test]
    async fn completes_without_cancellation() {
        let token = CancellationToken::new();
        assert_eq!(until_cancelled(&token, async { 7 }).await.unwrap(), 7);
    }
}
