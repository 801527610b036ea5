use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::SerdeError;

/// Cancellation and deadline carried through every codec call.
///
/// Only the registry-backed codecs ever wait on it; the rest are pure
/// CPU transforms.
#[derive(Debug, Clone, Default)]
pub struct SerdeContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl SerdeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: CancellationToken) -> Self {
        Self { token, deadline: None }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Run `fut` until it completes, the token is cancelled or the deadline
    /// passes. The last two surface as `ErrorKind::Cancelled`.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, SerdeError>
    where
        F: Future<Output = Result<T, SerdeError>>,
    {
        if self.token.is_cancelled() {
            return Err(SerdeError::cancelled("context cancelled"));
        }
        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(SerdeError::cancelled("context cancelled")),
            _ = deadline => Err(SerdeError::cancelled("context deadline exceeded")),
            res = fut => res,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn completes_when_not_cancelled() {
        let ctx = SerdeContext::new();
        let res = ctx.run(async { Ok::<_, SerdeError>(5) }).await;
        assert_eq!(res.unwrap(), 5);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = SerdeContext::with_token(token);
        let err = ctx
            .run(std::future::pending::<Result<(), SerdeError>>())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_pending_future() {
        let ctx = SerdeContext::new().with_timeout(Duration::from_millis(50));
        let err = ctx
            .run(std::future::pending::<Result<(), SerdeError>>())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(ctx.is_cancelled());
    }
}
