//! Settings shared by the platform clients.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{KeyValueCache, MemoryCache};
use crate::condition::{DEFAULT_WAIT_TIMEOUT, ResponseCallback};
use crate::scheduler::TaskScheduler;

/// Supplies the bearer token attached to platform requests.
///
/// Called right before a request is sent. The provider answers through the
/// callback, from any thread; `Ok(None)` sends the request unauthenticated
/// and an error fails it. It must not block the calling thread.
pub type TokenProvider = Arc<dyn Fn(ResponseCallback<Option<String>>) + Send + Sync>;

/// Default lifetime of a cached service endpoint.
pub const DEFAULT_API_CACHE_EXPIRY: Duration = Duration::from_secs(3600);

/// Configuration of a platform client.
#[derive(Clone)]
pub struct ClientSettings {
    /// Where request tasks run. Without a scheduler they run on the calling
    /// thread.
    pub task_scheduler: Option<Arc<dyn TaskScheduler>>,
    /// Cache consulted according to each request's fetch option.
    pub cache: Option<Arc<dyn KeyValueCache>>,
    /// Bound of every blocking wait on a remote sub-call.
    pub request_timeout: Duration,
    /// Expiry applied to cached partitions and data; `None` keeps them
    /// until evicted.
    pub default_cache_expiry: Option<Duration>,
    /// Expiry applied to cached service endpoints.
    pub api_cache_expiry: Duration,
}

impl ClientSettings {
    #[must_use]
    pub fn with_task_scheduler(mut self, scheduler: Arc<dyn TaskScheduler>) -> Self {
        self.task_scheduler = Some(scheduler);
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn KeyValueCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_default_cache_expiry(mut self, expiry: Duration) -> Self {
        self.default_cache_expiry = Some(expiry);
        self
    }

    /// The configured cache, or a fresh in-memory one.
    #[must_use]
    pub fn cache_or_default(&self) -> Arc<dyn KeyValueCache> {
        match &self.cache {
            Some(cache) => Arc::clone(cache),
            None => Arc::new(MemoryCache::new()),
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            task_scheduler: None,
            cache: None,
            request_timeout: DEFAULT_WAIT_TIMEOUT,
            default_cache_expiry: None,
            api_cache_expiry: DEFAULT_API_CACHE_EXPIRY,
        }
    }
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("task_scheduler", &self.task_scheduler.is_some())
            .field("cache", &self.cache.is_some())
            .field("request_timeout", &self.request_timeout)
            .field("default_cache_expiry", &self.default_cache_expiry)
            .field("api_cache_expiry", &self.api_cache_expiry)
            .finish()
    }
}
