//! Binding of a cancellable operation to its result delivery.
//!
//! A [`TaskContext`] owns the operation, the caller's callback and the
//! [`CancellationContext`] the operation runs under. Whatever happens, the
//! callback receives exactly one value: the operation's result, or
//! [`ApiError::cancelled`] if the task was cancelled before or while it ran.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::cancellation::{CancellationContext, CancellationToken};
use crate::error::{ApiError, ApiResponse};

/// The unit of work run by a task.
pub type Operation<T> = Box<dyn FnOnce(CancellationContext) -> ApiResponse<T> + Send>;

/// Receives the outcome of a task.
pub type Callback<T> = Box<dyn FnOnce(ApiResponse<T>) + Send>;

/// Execution state of a [`TaskContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Executing,
    Completed,
    Cancelled,
}

struct Slot<T> {
    state: TaskState,
    operation: Option<Operation<T>>,
    callback: Option<Callback<T>>,
}

struct Inner<T> {
    slot: Mutex<Slot<T>>,
    context: CancellationContext,
}

impl<T> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A cancellable unit of work and the callback awaiting its result.
///
/// Clones refer to the same task.
pub struct TaskContext<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for TaskContext<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> TaskContext<T> {
    /// Create a task from an operation and an optional callback.
    ///
    /// A task without a callback runs for its side effects only.
    pub fn new<F>(operation: F, callback: Option<Callback<T>>) -> Self
    where
        F: FnOnce(CancellationContext) -> ApiResponse<T> + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot {
                    state: TaskState::Created,
                    operation: Some(Box::new(operation)),
                    callback,
                }),
                context: CancellationContext::new(),
            }),
        }
    }

    /// Run the operation and deliver its result.
    ///
    /// Only the first call does anything. A task cancelled before it starts
    /// has already delivered its cancellation and is skipped.
    pub fn execute(&self) {
        let (operation, callback) = {
            let mut slot = self.inner.lock();
            if slot.state != TaskState::Created {
                return;
            }
            slot.state = TaskState::Executing;
            (slot.operation.take(), slot.callback.take())
        };

        let Some(operation) = operation else {
            return;
        };

        let context = self.inner.context.clone();
        let result = if context.is_cancelled() {
            Err(ApiError::cancelled())
        } else {
            operation(context.clone())
        };

        // Whatever the operation produced, a cancelled task reports the
        // cancellation rather than a partial outcome.
        let (state, result) = if context.is_cancelled() {
            (TaskState::Cancelled, Err(ApiError::cancelled()))
        } else {
            (TaskState::Completed, result)
        };

        self.inner.lock().state = state;
        if let Some(callback) = callback {
            callback(result);
        }
    }

    /// A token that cancels this task.
    ///
    /// Cancelling a task that has not started delivers the cancellation
    /// right away; cancelling a running task stops it at its next
    /// cancellation boundary. The token holds the task weakly.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        CancellationToken::new(move || {
            if let Some(inner) = weak.upgrade() {
                cancel(&inner);
            }
        })
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.inner.lock().state
    }
}

fn cancel<T>(inner: &Inner<T>) {
    inner.context.cancel_operation();

    let callback = {
        let mut slot = inner.lock();
        if slot.state != TaskState::Created {
            return;
        }
        slot.state = TaskState::Cancelled;
        slot.operation = None;
        slot.callback.take()
    };

    if let Some(callback) = callback {
        callback(Err(ApiError::cancelled()));
    }
}

impl<T> fmt::Debug for TaskContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("state", &self.inner.lock().state)
            .finish_non_exhaustive()
    }
}
