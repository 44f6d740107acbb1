//! Cooperative cancellation for multi-step operations.
//!
//! A [`CancellationContext`] guards one logical operation. Every remote
//! sub-call is started through [`CancellationContext::execute_or_cancelled`],
//! which refuses to start it once cancellation was requested and otherwise
//! remembers the sub-call's own [`CancellationToken`] so that a later
//! cancellation reaches it.
//!
//! Callers hold a [`CancellationToken`] obtained from
//! [`CancellationContext::token`]. The token references the context weakly,
//! so cancelling after the operation finished and dropped its context is a
//! no-op.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// A caller-held capability to request cancellation.
///
/// Cloning a token shares the underlying action. The default token does
/// nothing when cancelled.
#[derive(Clone, Default)]
pub struct CancellationToken {
    action: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl CancellationToken {
    /// Create a token running `action` on cancel.
    ///
    /// The action may run more than once if the token is cancelled more than
    /// once; actions are expected to be idempotent.
    pub fn new(action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            action: Some(Arc::new(action)),
        }
    }

    /// Combine several tokens into one that cancels all of them.
    #[must_use]
    pub fn from_tokens(tokens: Vec<CancellationToken>) -> Self {
        Self::new(move || {
            for token in &tokens {
                token.cancel();
            }
        })
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        if let Some(action) = &self.action {
            action();
        }
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("noop", &self.action.is_none())
            .finish()
    }
}

/// Lifecycle of a [`CancellationContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationState {
    /// Sub-calls may be started.
    Active,
    /// Cancellation was requested and downstream actions are being run.
    CancelRequested,
    /// All downstream actions have run.
    Cancelled,
}

type CancelAction = Box<dyn FnOnce() + Send>;

struct ContextInner {
    state: CancellationState,
    sub_operation: Option<CancellationToken>,
    actions: Vec<CancelAction>,
}

/// Guards one logical multi-step operation against cancellation.
///
/// Clones share state. The context is owned by the operation; hand out
/// [`CancellationToken`]s to let others cancel it.
#[derive(Clone)]
pub struct CancellationContext {
    inner: Arc<Mutex<ContextInner>>,
}

impl CancellationContext {
    /// Create an active context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ContextInner {
                state: CancellationState::Active,
                sub_operation: None,
                actions: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ContextInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a sub-call unless the context was cancelled.
    ///
    /// `execute` starts the sub-call and returns its token; the token is
    /// cancelled if cancellation arrives while the sub-call is in flight.
    /// When the context is already cancelled `execute` is not called and
    /// `on_cancelled` runs instead. Returns whether the sub-call was started.
    pub fn execute_or_cancelled<E, C>(&self, execute: E, on_cancelled: C) -> bool
    where
        E: FnOnce() -> CancellationToken,
        C: FnOnce(),
    {
        if self.is_cancelled() {
            on_cancelled();
            return false;
        }

        // The sub-call may complete synchronously and re-enter the context,
        // so it is started without holding the lock.
        let token = execute();

        let mut inner = self.lock();
        if inner.state == CancellationState::Active {
            inner.sub_operation = Some(token);
        } else {
            drop(inner);
            token.cancel();
        }
        true
    }

    /// Register an action to run once when the context is cancelled.
    ///
    /// Runs immediately if cancellation was already requested.
    pub fn on_cancel(&self, action: impl FnOnce() + Send + 'static) {
        let mut inner = self.lock();
        if inner.state == CancellationState::Active {
            inner.actions.push(Box::new(action));
        } else {
            drop(inner);
            action();
        }
    }

    /// Request cancellation. Repeated calls are no-ops.
    pub fn cancel_operation(&self) {
        let (sub_operation, actions) = {
            let mut inner = self.lock();
            if inner.state != CancellationState::Active {
                return;
            }
            inner.state = CancellationState::CancelRequested;
            (
                inner.sub_operation.take(),
                std::mem::take(&mut inner.actions),
            )
        };

        tracing::trace!(actions = actions.len(), "cancelling operation");

        if let Some(token) = sub_operation {
            token.cancel();
        }
        for action in actions {
            action();
        }

        self.lock().state = CancellationState::Cancelled;
    }

    /// Point-in-time check for a cancellation request.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.lock().state != CancellationState::Active
    }

    #[must_use]
    pub fn state(&self) -> CancellationState {
        self.lock().state
    }

    /// A detachable token that cancels this context while it is alive.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        let weak: Weak<Mutex<ContextInner>> = Arc::downgrade(&self.inner);
        CancellationToken::new(move || {
            if let Some(inner) = weak.upgrade() {
                CancellationContext { inner }.cancel_operation();
            }
        })
    }
}

impl Default for CancellationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationContext")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
