//! Fetch-policy orchestration over the cache and the remote services.
//!
//! Every repository function runs on a worker thread under the task's
//! [`CancellationContext`]. Remote calls are issued one at a time through
//! [`execute_blocking`], so a chain of calls reads as straight-line code
//! while staying cancellable and bounded by the request timeout.

pub(crate) mod api;
pub(crate) mod catalog;
pub(crate) mod data;
pub(crate) mod partitions;

use std::sync::Arc;

use geoplatform_core::condition::ResponseCallback;
use geoplatform_core::{
    ApiError, ApiResponse, CancellationContext, CancellationToken, ClientSettings, ErrorCode,
    KeyValueCache, execute_blocking,
};

use crate::api::ApiClients;

/// Everything a repository needs to serve one layer.
#[derive(Clone)]
pub(crate) struct LayerContext {
    pub catalog: String,
    pub layer: String,
    /// Version fixed by the client; resolved per request when absent.
    pub version: Option<i64>,
    pub settings: ClientSettings,
    pub cache: Arc<dyn KeyValueCache>,
    pub apis: ApiClients,
}

impl LayerContext {
    /// Store `value` under `key`, logging instead of failing.
    pub fn cache_put(&self, key: &str, value: Vec<u8>, expiry: Option<std::time::Duration>) {
        if let Err(e) = self.cache.put(key, value, expiry) {
            tracing::warn!(key, error = %e, "failed to write cache");
        }
    }
}

/// Run one remote call of a chain as a blocking step.
///
/// Failures are reported as a retryable `ServiceUnavailable` naming the
/// step; cancellations and timeouts pass through unchanged.
pub(crate) fn remote_step<T, F>(
    context: &CancellationContext,
    layer: &LayerContext,
    step: &str,
    call: F,
) -> ApiResponse<T>
where
    T: Send + 'static,
    F: FnOnce(ResponseCallback<T>) -> CancellationToken,
{
    tracing::debug!(catalog = %layer.catalog, layer = %layer.layer, step, "remote step");
    execute_blocking(context, layer.settings.request_timeout, call).map_err(|error| {
        match error.code {
            ErrorCode::Cancelled => {
                tracing::debug!(step, "cancelled");
                error
            }
            ErrorCode::RequestTimeout => error,
            _ => ApiError {
                code: ErrorCode::ServiceUnavailable,
                message: format!("{step} failed: {}", error.message),
                retryable: true,
                http_status: error.http_status,
            },
        }
    })
}
