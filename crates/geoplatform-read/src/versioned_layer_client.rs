//! Client for reading data from a versioned layer.

use std::fmt;
use std::sync::Arc;

use geoplatform_core::task_context::Callback;
use geoplatform_core::{
    CacheError, CancellableFuture, CancellationToken, ClientSettings, PendingRequests,
    TaskContext, TaskScheduler, execute_or_schedule,
};

use crate::api::ApiClients;
use crate::model::Data;
use crate::repositories::{LayerContext, catalog, data, partitions};
use crate::request::{DataRequest, FetchOption};

/// Receives the outcome of a data request.
pub type DataCallback = Callback<Data>;

/// Reads partitions of one layer of a versioned catalog.
///
/// Requests run on the configured task scheduler, or on the calling thread
/// when there is none. Dropping the client cancels every request still in
/// flight; their callbacks receive a cancellation.
pub struct VersionedLayerClient {
    layer: LayerContext,
    task_scheduler: Option<Arc<dyn TaskScheduler>>,
    pending_requests: Arc<PendingRequests>,
}

impl VersionedLayerClient {
    /// Create a client for `layer_id` in `catalog`.
    ///
    /// With `version` unset, each request reads the version it names, or
    /// the catalog's latest version.
    pub fn new(
        catalog: impl Into<String>,
        layer_id: impl Into<String>,
        version: Option<i64>,
        mut settings: ClientSettings,
        apis: ApiClients,
    ) -> Self {
        let cache = settings.cache_or_default();
        // Tasks never schedule further tasks, so they don't carry the scheduler.
        let task_scheduler = settings.task_scheduler.take();

        Self {
            layer: LayerContext {
                catalog: catalog.into(),
                layer: layer_id.into(),
                version,
                settings,
                cache,
                apis,
            },
            task_scheduler,
            pending_requests: Arc::new(PendingRequests::new()),
        }
    }

    /// Fetch the data named by `request` and pass it to `callback`.
    ///
    /// The callback runs exactly once, with the data, an error, or a
    /// cancellation. With [`FetchOption::CacheWithUpdate`] the callback
    /// receives the cached answer while the cache is refreshed in the
    /// background; the returned token cancels both.
    pub fn get_data(&self, request: DataRequest, callback: DataCallback) -> CancellationToken {
        if request.fetch_option() != FetchOption::CacheWithUpdate {
            return self.add_task(request, Some(callback));
        }

        let cache_token = self.add_task(
            request.clone().with_fetch_option(FetchOption::CacheOnly),
            Some(callback),
        );
        let online_token = self.add_task(
            request.with_fetch_option(FetchOption::OnlineIfNotFound),
            None,
        );
        CancellationToken::from_tokens(vec![cache_token, online_token])
    }

    /// Fetch the data named by `request` as an awaitable result.
    #[must_use]
    pub fn get_data_future(&self, request: DataRequest) -> CancellableFuture<Data> {
        CancellableFuture::from_callback(|callback| self.get_data(request, callback))
    }

    /// Remove a partition's cached metadata and data.
    ///
    /// Uses the client's version, or the last latest version seen. Nothing
    /// is removed if neither is known.
    pub fn remove_from_cache(&self, partition_id: &str) -> Result<(), CacheError> {
        let layer = &self.layer;
        let Some(version) = layer.version.or_else(|| catalog::cached_latest_version(layer)) else {
            return Ok(());
        };

        if let Some(partition) = partitions::cached_partition(layer, partition_id, version) {
            layer.cache.remove(&data::cache_key(
                &layer.catalog,
                &layer.layer,
                &partition.data_handle,
            ))?;
        }
        layer.cache.remove(&partitions::cache_key(
            &layer.catalog,
            &layer.layer,
            partition_id,
            version,
        ))
    }

    fn add_task(&self, request: DataRequest, callback: Option<DataCallback>) -> CancellationToken {
        let layer = self.layer.clone();
        let task = TaskContext::new(
            move |context| data::get_versioned_data(&layer, &context, &request),
            callback,
        );

        let token = task.cancel_token();
        let Some(id) = self.pending_requests.insert(token.clone()) else {
            return token;
        };

        let pending_requests = Arc::clone(&self.pending_requests);
        execute_or_schedule(self.task_scheduler.as_ref(), move || {
            task.execute();
            pending_requests.remove(id);
        });
        token
    }
}

impl Drop for VersionedLayerClient {
    fn drop(&mut self) {
        self.pending_requests.cancel_pending_requests();
    }
}

impl fmt::Debug for VersionedLayerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedLayerClient")
            .field("catalog", &self.layer.catalog)
            .field("layer", &self.layer.layer)
            .field("version", &self.layer.version)
            .field("pending_requests", &self.pending_requests.len())
            .finish_non_exhaustive()
    }
}
