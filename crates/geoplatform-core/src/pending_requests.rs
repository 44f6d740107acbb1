//! Registry of a client's in-flight requests.
//!
//! A client inserts every dispatched task and removes it once the task has
//! run. On teardown it calls [`PendingRequests::cancel_pending_requests`],
//! which closes the registry and cancels whatever is still tracked, so no
//! request outlives the resources of the client that issued it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::cancellation::CancellationToken;

/// Identity of a tracked request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

#[derive(Debug, Default)]
struct Registry {
    closed: bool,
    next_id: u64,
    requests: HashMap<RequestId, CancellationToken>,
}

/// Thread-safe collection of live requests.
#[derive(Debug, Default)]
pub struct PendingRequests {
    registry: Mutex<Registry>,
}

impl PendingRequests {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track a request by its cancellation token.
    ///
    /// Once the registry is closed the request is cancelled immediately and
    /// `None` is returned.
    pub fn insert(&self, token: CancellationToken) -> Option<RequestId> {
        let mut registry = self.lock();
        if registry.closed {
            drop(registry);
            tracing::debug!("registry closed, cancelling new request");
            token.cancel();
            return None;
        }

        let id = RequestId(registry.next_id);
        registry.next_id += 1;
        registry.requests.insert(id, token);
        Some(id)
    }

    /// Stop tracking a finished request.
    pub fn remove(&self, id: RequestId) -> bool {
        self.lock().requests.remove(&id).is_some()
    }

    /// Close the registry and cancel every tracked request.
    ///
    /// Each tracked request is cancelled once; later calls find the
    /// registry empty.
    pub fn cancel_pending_requests(&self) {
        let requests = {
            let mut registry = self.lock();
            registry.closed = true;
            std::mem::take(&mut registry.requests)
        };

        if !requests.is_empty() {
            tracing::debug!(count = requests.len(), "cancelling pending requests");
        }
        for token in requests.into_values() {
            token.cancel();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().requests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
