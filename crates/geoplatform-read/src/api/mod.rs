//! Remote services the repositories talk to.
//!
//! Each service is a trait with one callback-based method per call. The
//! repositories bridge those calls into blocking steps, so an
//! implementation may reply on any thread, or synchronously before
//! returning. [`HttpApis`] implements all of them over HTTP.

mod http;

use std::sync::Arc;

use geoplatform_core::{ApiResponse, CancellationToken};

use crate::model::{Api, Data, Partitions};

pub use http::{DEFAULT_LOOKUP_URL, HttpApis};

/// Receives the reply of a service call.
pub type ApiCallback<T> = Box<dyn FnOnce(ApiResponse<T>) + Send>;

/// Discovers service endpoints of a catalog.
pub trait ApiLookup: Send + Sync {
    fn lookup_api(
        &self,
        catalog: &str,
        service: &str,
        service_version: &str,
        callback: ApiCallback<Vec<Api>>,
    ) -> CancellationToken;
}

/// The query service.
pub trait QueryApi: Send + Sync {
    /// Fetch metadata of the partitions named in `partition_ids`.
    ///
    /// Partitions that do not exist are left out of the reply.
    fn get_partitions_by_id(
        &self,
        base_url: &str,
        layer: &str,
        partition_ids: &[String],
        version: Option<i64>,
        callback: ApiCallback<Partitions>,
    ) -> CancellationToken;
}

/// The blob service.
pub trait BlobApi: Send + Sync {
    fn get_blob(
        &self,
        base_url: &str,
        layer: &str,
        data_handle: &str,
        callback: ApiCallback<Data>,
    ) -> CancellationToken;
}

/// The metadata service.
pub trait MetadataApi: Send + Sync {
    /// Latest version of the catalog, starting the search at
    /// `start_version`.
    fn get_latest_catalog_version(
        &self,
        base_url: &str,
        start_version: i64,
        callback: ApiCallback<i64>,
    ) -> CancellationToken;
}

/// The set of services a client uses.
#[derive(Clone)]
pub struct ApiClients {
    pub lookup: Arc<dyn ApiLookup>,
    pub query: Arc<dyn QueryApi>,
    pub blob: Arc<dyn BlobApi>,
    pub metadata: Arc<dyn MetadataApi>,
}

impl ApiClients {
    /// Use one HTTP implementation for every service.
    #[must_use]
    pub fn http(apis: HttpApis) -> Self {
        let apis = Arc::new(apis);
        Self {
            lookup: apis.clone(),
            query: apis.clone(),
            blob: apis.clone(),
            metadata: apis,
        }
    }
}

impl std::fmt::Debug for ApiClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClients").finish_non_exhaustive()
    }
}
