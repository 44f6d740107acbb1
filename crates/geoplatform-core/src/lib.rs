//! Shared building blocks of the geoplatform client SDK.
//!
//! This crate provides the request-orchestration machinery the data and
//! authentication clients are built on: cooperative cancellation, a
//! blocking bridge for callback-based sub-calls, task contexts delivering
//! results exactly once, a registry of in-flight requests, task schedulers,
//! a key-value cache and an HTTP transport.
//!
//! # Design principles
//!
//! - **Callback core**: every request is implemented once against a
//!   callback; [`CancellableFuture`] adapts it for callers that prefer to
//!   await or block
//! - **Cooperative cancellation**: cancellation is checked at sub-call
//!   boundaries and at every wait, never preemptively
//! - **Bounded waits**: a wait that times out is reported as a retryable
//!   timeout, never dropped

pub mod cache;
pub mod cancellation;
pub mod condition;
mod error;
pub mod future;
pub mod network;
pub mod pending_requests;
pub mod scheduler;
mod settings;
pub mod task_context;

pub use cache::{KeyValueCache, MemoryCache};
pub use cancellation::{CancellationContext, CancellationState, CancellationToken};
pub use condition::{Condition, Notifier, WaitOutcome, execute_blocking};
pub use error::{ApiError, ApiResponse, CacheError, ErrorCode};
pub use future::CancellableFuture;
pub use network::{HttpNetwork, NetworkRequest, NetworkResponse};
pub use pending_requests::{PendingRequests, RequestId};
pub use scheduler::{TaskScheduler, ThreadPoolTaskScheduler, execute_or_schedule};
pub use settings::{ClientSettings, DEFAULT_API_CACHE_EXPIRY, TokenProvider};
pub use task_context::{TaskContext, TaskState};
