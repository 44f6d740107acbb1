//! Read access to versioned layers of geoplatform catalogs.
//!
//! A [`VersionedLayerClient`] fetches partition data through a chain of
//! remote calls: discover the query service, look up the partition's data
//! handle, discover the blob service, and download the blob. Each request
//! chooses how the cache takes part through its [`FetchOption`].
//!
//! # Example
//!
//! ```no_run
//! use geoplatform_core::{ClientSettings, HttpNetwork};
//! use geoplatform_read::{ApiClients, DataRequest, FetchOption, HttpApis, VersionedLayerClient};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = tokio::runtime::Runtime::new()?;
//! let apis = ApiClients::http(HttpApis::new(HttpNetwork::new(runtime.handle().clone())));
//! let client = VersionedLayerClient::new(
//!     "hrn:here:data::olp-here-test:edge-example-catalog",
//!     "versioned-world-layer",
//!     None,
//!     ClientSettings::default(),
//!     apis,
//! );
//!
//! let data = client
//!     .get_data_future(
//!         DataRequest::new()
//!             .with_partition_id("1")
//!             .with_fetch_option(FetchOption::OnlineIfNotFound),
//!     )
//!     .wait()?;
//! println!("{} bytes", data.len());
//! # Ok(())
//! # }
//! ```

pub mod api;
mod model;
mod repositories;
mod request;
mod versioned_layer_client;

pub use api::{ApiClients, HttpApis};
pub use model::{Api, CatalogVersion, Data, Partition, Partitions};
pub use request::{DataRequest, FetchOption, ParseFetchOptionError};
pub use versioned_layer_client::{DataCallback, VersionedLayerClient};
