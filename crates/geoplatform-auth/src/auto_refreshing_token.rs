//! A shared access token that refreshes itself before it expires.
//!
//! Any number of requests may ask for the token at once. While a usable
//! token is held it is handed out directly. Otherwise the first caller
//! starts a single refresh and every caller arriving before it completes is
//! queued behind it; the refresh outcome is fanned out to the whole queue.
//! A refresh that has not answered within the endpoint's request timeout
//! fails with [`ApiError::request_timeout`], so the next caller starts a new
//! one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;

use geoplatform_core::{
    ApiError, ApiResponse, CancellationContext, CancellationToken, Condition, ErrorCode, Notifier,
    WaitOutcome, execute_blocking,
};

use crate::token_endpoint::{TokenCallback, TokenEndpoint, TokenRequest, TokenResult};

/// Tokens expiring within this margin are refreshed before use.
pub const DEFAULT_MINIMUM_VALIDITY: Duration = Duration::from_secs(300);

/// Where an [`AutoRefreshingToken`] stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// No token was requested yet, or it was released.
    NoToken,
    /// A token that has not expired is held.
    Valid,
    /// A refresh is in flight.
    Refreshing,
    /// The held token expired or the last refresh failed.
    Expired,
}

#[derive(Default)]
struct Shared {
    token: Option<TokenResult>,
    refreshing: bool,
    refresh_cancel: Option<CancellationToken>,
    /// Stops the deadline of the refresh in flight.
    refresh_done: Option<Notifier>,
    refresh_failed: bool,
    /// Bumped by every refresh and release so late replies can be told apart.
    generation: u64,
    waiters: Vec<TokenCallback>,
}

struct Inner {
    endpoint: TokenEndpoint,
    request: TokenRequest,
    shared: Mutex<Shared>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, generation: u64, response: ApiResponse<TokenResult>) {
        let (waiters, outcome) = {
            let mut shared = self.lock();
            if shared.generation != generation || !shared.refreshing {
                return;
            }
            shared.refreshing = false;
            shared.refresh_cancel = None;
            if let Some(done) = shared.refresh_done.take() {
                done.notify();
            }

            let outcome = match response {
                Ok(token) if token.is_success() => {
                    tracing::debug!(remaining = ?token.remaining(), "token refreshed");
                    shared.refresh_failed = false;
                    shared.token = Some(token.clone());
                    Ok(token)
                }
                failed => {
                    let error = refresh_error(failed);
                    match shared.token.as_ref().filter(|token| !token.is_expired()) {
                        Some(stale) => {
                            tracing::warn!(%error, "token refresh failed, keeping current token");
                            Ok(stale.clone())
                        }
                        None => {
                            tracing::warn!(%error, "token refresh failed");
                            shared.token = None;
                            shared.refresh_failed = true;
                            Err(error)
                        }
                    }
                }
            };

            (std::mem::take(&mut shared.waiters), outcome)
        };

        for waiter in waiters {
            waiter(outcome.clone());
        }
    }

    /// Fail refresh `generation` if it is still in flight.
    fn expire(&self, generation: u64) {
        let cancel = {
            let mut shared = self.lock();
            if shared.generation != generation || !shared.refreshing {
                return;
            }
            shared.refresh_cancel.take()
        };

        tracing::warn!(timeout = ?self.endpoint.request_timeout(), "token refresh timed out");
        self.complete(generation, Err(ApiError::request_timeout()));
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
    }
}

fn refresh_error(response: ApiResponse<TokenResult>) -> ApiError {
    match response {
        Ok(result) => result.to_error(),
        Err(error) if error.is_cancelled() || error.code == ErrorCode::RequestTimeout => error,
        Err(error) => ApiError {
            code: ErrorCode::AuthenticationFailure,
            message: format!("Token refresh failed: {error}"),
            retryable: error.retryable,
            http_status: error.http_status,
        },
    }
}

/// A token handle shared by concurrent requesters.
///
/// Clones share the same token.
#[derive(Clone)]
pub struct AutoRefreshingToken {
    inner: Arc<Inner>,
}

impl AutoRefreshingToken {
    pub(crate) fn new(endpoint: TokenEndpoint, request: TokenRequest) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint,
                request,
                shared: Mutex::new(Shared::default()),
            }),
        }
    }

    /// Deliver a token valid for at least `minimum_validity` to `callback`.
    ///
    /// Returns immediately if such a token is held; otherwise the callback
    /// waits for the refresh in flight, starting one if needed. The callback
    /// is answered within the endpoint's request timeout.
    pub fn get_token(&self, minimum_validity: Duration, callback: TokenCallback) {
        let (generation, deadline) = {
            let mut shared = self.inner.lock();
            let usable = shared
                .token
                .as_ref()
                .filter(|token| token.remaining() > minimum_validity)
                .cloned();
            if let Some(token) = usable {
                drop(shared);
                callback(Ok(token));
                return;
            }

            shared.waiters.push(callback);
            if shared.refreshing {
                return;
            }
            let deadline = Condition::new(&CancellationContext::new());
            shared.refreshing = true;
            shared.refresh_done = Some(deadline.notifier());
            shared.generation += 1;
            (shared.generation, deadline)
        };

        tracing::debug!("refreshing token");
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let cancel = self.inner.endpoint.request_token(
            &self.inner.request,
            Box::new(move |response| {
                if let Some(inner) = weak.upgrade() {
                    inner.complete(generation, response);
                }
            }),
        );

        // The reply may already have arrived; only an unfinished refresh
        // keeps its token.
        {
            let mut shared = self.inner.lock();
            if shared.refreshing && shared.generation == generation {
                shared.refresh_cancel = Some(cancel);
            }
        }

        let watched = Arc::downgrade(&self.inner);
        let timeout = self.inner.endpoint.request_timeout();
        let watchdog = thread::Builder::new()
            .name("token-refresh-deadline".to_string())
            .spawn(move || {
                if deadline.wait(timeout) == WaitOutcome::TimedOut
                    && let Some(inner) = watched.upgrade()
                {
                    inner.expire(generation);
                }
            });
        if let Err(e) = watchdog {
            tracing::error!(error = %e, "failed to start token refresh deadline");
        }
    }

    /// Block until a token valid for at least `minimum_validity` is
    /// available, `context` is cancelled, or the endpoint's request timeout
    /// elapses.
    ///
    /// Cancelling `context` abandons this wait only; the shared refresh keeps
    /// running for the other callers.
    pub fn get_token_blocking(
        &self,
        context: &CancellationContext,
        minimum_validity: Duration,
    ) -> ApiResponse<TokenResult> {
        execute_blocking(context, self.inner.endpoint.request_timeout(), |callback| {
            self.get_token(minimum_validity, callback);
            CancellationToken::default()
        })
    }

    #[must_use]
    pub fn state(&self) -> TokenState {
        let shared = self.inner.lock();
        if shared.refreshing {
            return TokenState::Refreshing;
        }
        match &shared.token {
            Some(token) if !token.is_expired() => TokenState::Valid,
            Some(_) => TokenState::Expired,
            None if shared.refresh_failed => TokenState::Expired,
            None => TokenState::NoToken,
        }
    }

    /// Drop the held token and abandon a refresh in flight.
    ///
    /// Callers waiting for that refresh receive [`ApiError::cancelled`].
    pub fn release(&self) {
        let (cancel, waiters) = {
            let mut shared = self.inner.lock();
            shared.token = None;
            shared.refreshing = false;
            shared.refresh_failed = false;
            shared.generation += 1;
            if let Some(done) = shared.refresh_done.take() {
                done.notify();
            }
            (
                shared.refresh_cancel.take(),
                std::mem::take(&mut shared.waiters),
            )
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        for waiter in waiters {
            waiter(Err(ApiError::cancelled()));
        }
    }
}
