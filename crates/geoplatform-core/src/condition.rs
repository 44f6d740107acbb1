//! Blocking bridge between callback-based sub-calls and worker tasks.
//!
//! A task running on a worker thread issues an asynchronous sub-call and
//! then blocks on a [`Condition`] until the sub-call's completion handler
//! notifies it, the wait times out, or the enclosing
//! [`CancellationContext`] is cancelled. Each step allocates a fresh
//! condition.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::cancellation::{CancellationContext, CancellationToken};
use crate::error::{ApiError, ApiResponse};

/// Default bound for a single bridged wait.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// How a [`Condition::wait`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The sub-call notified completion.
    Signaled,
    /// The timeout elapsed first.
    TimedOut,
    /// The enclosing context was cancelled.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Pending,
    Signaled,
    Cancelled,
}

#[derive(Debug)]
struct Shared {
    signal: Mutex<Signal>,
    condvar: Condvar,
}

impl Shared {
    /// Only the first signal after creation is kept.
    fn set(&self, value: Signal) {
        let mut signal = self.signal.lock().unwrap_or_else(PoisonError::into_inner);
        if *signal == Signal::Pending {
            *signal = value;
            self.condvar.notify_all();
        }
    }
}

/// A single-use binary signal scoped to one blocking step.
#[derive(Debug)]
pub struct Condition {
    shared: Arc<Shared>,
}

impl Condition {
    /// Create a condition bound to `context`.
    ///
    /// Cancelling the context wakes the waiter with
    /// [`WaitOutcome::Cancelled`].
    #[must_use]
    pub fn new(context: &CancellationContext) -> Self {
        let shared = Arc::new(Shared {
            signal: Mutex::new(Signal::Pending),
            condvar: Condvar::new(),
        });

        let weak = Arc::downgrade(&shared);
        context.on_cancel(move || {
            if let Some(shared) = weak.upgrade() {
                shared.set(Signal::Cancelled);
            }
        });

        Self { shared }
    }

    /// A handle the sub-call's completion handler uses to signal.
    #[must_use]
    pub fn notifier(&self) -> Notifier {
        Notifier {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Block until notified, cancelled, or `timeout` elapses.
    ///
    /// Consumes the condition: there is exactly one wait per instance.
    #[must_use]
    pub fn wait(self, timeout: Duration) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        let mut signal = self
            .shared
            .signal
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        loop {
            match *signal {
                Signal::Signaled => return WaitOutcome::Signaled,
                Signal::Cancelled => return WaitOutcome::Cancelled,
                Signal::Pending => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::TimedOut;
            }

            signal = self
                .shared
                .condvar
                .wait_timeout(signal, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// Signals a [`Condition`]; safe to use from any thread.
#[derive(Debug, Clone)]
pub struct Notifier {
    shared: Arc<Shared>,
}

impl Notifier {
    /// Signal completion. Later calls have no effect.
    pub fn notify(&self) {
        self.shared.set(Signal::Signaled);
    }
}

/// Completion handler passed to a bridged sub-call.
pub type ResponseCallback<T> = Box<dyn FnOnce(ApiResponse<T>) + Send>;

/// Run a callback-based sub-call as a blocking, cancellable step.
///
/// `call` receives the completion handler and returns the sub-call's
/// cancellation token. The sub-call is only started if `context` is not yet
/// cancelled. A wait that times out while the context is still active yields
/// a retryable [`ApiError::request_timeout`]; a cancelled context yields
/// [`ApiError::cancelled`].
pub fn execute_blocking<T, F>(
    context: &CancellationContext,
    timeout: Duration,
    call: F,
) -> ApiResponse<T>
where
    T: Send + 'static,
    F: FnOnce(ResponseCallback<T>) -> CancellationToken,
{
    let condition = Condition::new(context);
    let notifier = condition.notifier();
    let slot: Arc<Mutex<Option<ApiResponse<T>>>> = Arc::new(Mutex::new(None));

    let sink = Arc::clone(&slot);
    context.execute_or_cancelled(
        || {
            call(Box::new(move |response| {
                *sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(response);
                notifier.notify();
            }))
        },
        || {},
    );

    match condition.wait(timeout) {
        WaitOutcome::Signaled => slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_else(|| Err(ApiError::invalid_response("Sub-call completed without a result."))),
        WaitOutcome::Cancelled => Err(ApiError::cancelled()),
        WaitOutcome::TimedOut if context.is_cancelled() => Err(ApiError::cancelled()),
        WaitOutcome::TimedOut => Err(ApiError::request_timeout()),
    }
}
