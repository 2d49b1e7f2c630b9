//! Per-request call context
//!
//! Every store call made on behalf of a request goes through
//! [`CallContext::guard`], which races the call against the caller's
//! cancellation token, an optional absolute deadline and an optional
//! per-call timeout. Whichever fires first ends the call with
//! [`TopoError::Cancelled`]; partial results are never returned.

use crate::error::{CancelReason, TopoError};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use topo_model::OwnerId;
use topo_store::StoreError;
use tracing::error;
use ulid::Ulid;

/// Scope and limits of one top-level operation
#[derive(Debug, Clone)]
pub struct CallContext {
    owner: OwnerId,
    request_id: Ulid,
    deadline: Option<Instant>,
    call_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl CallContext {
    /// Create context scoped to `owner`
    #[must_use]
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            request_id: Ulid::new(),
            deadline: None,
            call_timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// With absolute deadline
    #[inline]
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// With deadline `budget` from now
    #[inline]
    #[must_use]
    pub fn with_budget(self, budget: Duration) -> Self {
        self.with_deadline(Instant::now() + budget)
    }

    /// With per store call timeout
    #[inline]
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// With caller-owned cancellation token
    #[inline]
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Owning-account scope
    #[inline]
    #[must_use]
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Request correlation id
    #[inline]
    #[must_use]
    pub fn request_id(&self) -> Ulid {
        self.request_id
    }

    /// Token that cancels this context
    #[inline]
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Same scope and request id, without cancellation or deadline
    ///
    /// Used for compensating writes that must run even after the request
    /// was cancelled. The per-call timeout still applies.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self {
            owner: self.owner.clone(),
            request_id: self.request_id,
            deadline: None,
            call_timeout: self.call_timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Fail fast if the context is already cancelled or expired
    ///
    /// # Errors
    /// `Cancelled` when the token fired or the deadline passed
    pub fn check(&self) -> Result<(), TopoError> {
        if self.cancel.is_cancelled() {
            return Err(TopoError::cancelled(CancelReason::Requested));
        }
        if self.deadline.is_some_and(|at| Instant::now() >= at) {
            return Err(TopoError::cancelled(CancelReason::DeadlineExpired));
        }
        Ok(())
    }

    /// Run `fut` unless the context is cancelled or its deadline passes first
    ///
    /// # Errors
    /// `Cancelled` when the token or the deadline wins the race
    pub async fn run<T, F>(&self, fut: F) -> Result<T, TopoError>
    where
        F: Future<Output = T>,
    {
        self.check()?;
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(TopoError::cancelled(CancelReason::Requested)),
            () = deadline => Err(TopoError::cancelled(CancelReason::DeadlineExpired)),
            value = fut => Ok(value),
        }
    }

    /// Run one store call under cancellation, deadline and call timeout
    ///
    /// # Errors
    /// `Cancelled` on expiry, otherwise the store error converted
    pub async fn guard<T, F>(&self, op: &'static str, call: F) -> Result<T, TopoError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let timed = async {
            let outcome = match self.call_timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(outcome) => outcome,
                    Err(_) => return Err(TopoError::cancelled(CancelReason::CallTimeout)),
                },
                None => call.await,
            };
            outcome.map_err(TopoError::from)
        };
        let result = self.run(timed).await.and_then(|inner| inner);
        if let Err(TopoError::Store(err)) = &result {
            error!(op, request_id = %self.request_id, error = %err, "store call failed");
        }
        result
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new(OwnerId::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_slow_call() {
        let ctx = CallContext::default().with_budget(Duration::from_millis(50));
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, StoreError>(1)
        };
        assert_eq!(
            ctx.guard("search", slow).await,
            Err(TopoError::cancelled(CancelReason::DeadlineExpired))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn call_timeout_is_reported() {
        let ctx = CallContext::default().with_call_timeout(Some(Duration::from_millis(10)));
        let slow = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, StoreError>(())
        };
        let err = ctx.guard("search", slow).await.unwrap_err();
        assert_eq!(err, TopoError::cancelled(CancelReason::CallTimeout));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_calling() {
        let token = CancellationToken::new();
        let ctx = CallContext::default().with_cancellation(token.clone());
        token.cancel();
        let result = ctx.guard("create", async { Ok::<_, StoreError>(()) }).await;
        assert_eq!(result, Err(TopoError::cancelled(CancelReason::Requested)));
    }

    #[tokio::test]
    async fn detached_context_outlives_cancellation() {
        let token = CancellationToken::new();
        let ctx = CallContext::default()
            .with_cancellation(token.clone())
            .with_budget(Duration::from_secs(60));
        token.cancel();

        let detached = ctx.detached();
        assert_eq!(detached.request_id(), ctx.request_id());
        assert_eq!(detached.guard("delete", async { Ok::<_, StoreError>(3) }).await, Ok(3));
    }

    #[tokio::test]
    async fn store_errors_pass_through() {
        let ctx = CallContext::default();
        let result = ctx
            .guard("delete", async {
                Err::<(), _>(StoreError::Unavailable("connection reset".into()))
            })
            .await;
        assert_eq!(
            result,
            Err(TopoError::Store(StoreError::Unavailable("connection reset".into())))
        );
    }
}
