//! Awaitable handle for callback-based requests.
//!
//! Every request has one canonical callback-based implementation. The
//! [`CancellableFuture`] returned by the awaitable overloads is fulfilled
//! from that callback through a one-shot channel.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::cancellation::CancellationToken;
use crate::error::{ApiError, ApiResponse, ErrorCode};
use crate::task_context::Callback;

/// The pending result of a request together with its cancellation token.
///
/// Await it from async code, or call [`wait`](Self::wait) from a plain
/// thread. If the request is dropped without answering, the result is
/// [`ApiError::cancelled`].
#[derive(Debug)]
pub struct CancellableFuture<T> {
    token: CancellationToken,
    receiver: oneshot::Receiver<ApiResponse<T>>,
}

impl<T: Send + 'static> CancellableFuture<T> {
    /// Issue a callback-based request and adapt it.
    ///
    /// `start` receives the callback that fulfils the future and returns
    /// the request's cancellation token.
    pub fn from_callback<F>(start: F) -> Self
    where
        F: FnOnce(Callback<T>) -> CancellationToken,
    {
        let (sender, receiver) = oneshot::channel();
        let token = start(Box::new(move |result| {
            // The receiver may have been dropped; nobody is waiting then.
            let _ = sender.send(result);
        }));
        Self { token, receiver }
    }
}

impl<T> CancellableFuture<T> {
    /// The token cancelling the underlying request.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Block the current thread until the result arrives.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait(self) -> ApiResponse<T> {
        self.receiver
            .blocking_recv()
            .unwrap_or_else(|_| Err(ApiError::cancelled()))
    }

    /// Block for at most `timeout`.
    ///
    /// Returns `Err(self)` if the result is not ready in time so the caller
    /// can keep waiting or cancel. Like [`wait`](Self::wait), must not be
    /// called from inside an async runtime.
    pub fn wait_timeout(mut self, timeout: Duration) -> Result<ApiResponse<T>, Self> {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                return Ok(Err(ApiError::new(
                    ErrorCode::Unknown,
                    format!("failed to start a timer: {e}"),
                    false,
                )));
            }
        };

        match runtime.block_on(tokio::time::timeout(timeout, &mut self.receiver)) {
            Ok(received) => Ok(received.unwrap_or_else(|_| Err(ApiError::cancelled()))),
            Err(_) => Err(self),
        }
    }
}

impl<T> Future for CancellableFuture<T> {
    type Output = ApiResponse<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(ApiError::cancelled())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_returns_callback_value() {
        let future = CancellableFuture::from_callback(|callback| {
            thread::spawn(move || callback(Ok("done")));
            CancellationToken::default()
        });
        assert_eq!(future.wait(), Ok("done"));
    }

    #[test]
    fn test_dropped_callback_resolves_cancelled() {
        let future: CancellableFuture<u8> = CancellableFuture::from_callback(|callback| {
            drop(callback);
            CancellationToken::default()
        });
        assert!(future.wait().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_wait_timeout_hands_back_future() {
        let mut pending = None;
        let future: CancellableFuture<u8> = CancellableFuture::from_callback(|callback| {
            pending = Some(callback);
            CancellationToken::default()
        });

        let future = future
            .wait_timeout(Duration::from_millis(5))
            .expect_err("no result yet");

        (pending.take().unwrap())(Ok(3));
        assert_eq!(future.wait_timeout(Duration::from_secs(1)).unwrap(), Ok(3));
    }

    #[test]
    fn test_wait_timeout_wakes_on_late_result() {
        let future = CancellableFuture::from_callback(|callback| {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                callback(Ok("late"));
            });
            CancellationToken::default()
        });

        let started = std::time::Instant::now();
        assert_eq!(future.wait_timeout(Duration::from_secs(5)).unwrap(), Ok("late"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_await_result() {
        let future = CancellableFuture::from_callback(|callback| {
            thread::spawn(move || callback(Ok(5_u32)));
            CancellationToken::default()
        });
        assert_eq!(future.await, Ok(5));
    }
}
