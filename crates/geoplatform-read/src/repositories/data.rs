//! Partition data retrieval: the full lookup chain behind a data request.

use geoplatform_core::{ApiError, ApiResponse, CancellationContext};

use super::{LayerContext, api, catalog, partitions, remote_step};
use crate::model::Data;
use crate::request::{DataRequest, FetchOption};

pub(crate) fn cache_key(catalog: &str, layer: &str, data_handle: &str) -> String {
    format!("{catalog}::{layer}::{data_handle}::Data")
}

/// Data of the partition or data handle named by `request`.
///
/// A partition the query service does not know yields empty data.
pub(crate) fn get_versioned_data(
    layer: &LayerContext,
    context: &CancellationContext,
    request: &DataRequest,
) -> ApiResponse<Data> {
    request.validate()?;
    let fetch_option = request.fetch_option();

    let data_handle = match (request.data_handle(), request.partition_id()) {
        (Some(handle), _) => handle.to_string(),
        (None, Some(partition_id)) => {
            let version = match request.version().or(layer.version) {
                Some(version) => version,
                None => catalog::get_latest_version(layer, context, fetch_option)?,
            };
            match partitions::get_partition_by_id(
                layer,
                context,
                partition_id,
                version,
                fetch_option,
            )? {
                Some(partition) => partition.data_handle,
                None => return Ok(Data::new()),
            }
        }
        (None, None) => {
            return Err(ApiError::precondition_failed(
                "Either partition id or data handle must be set.",
            ));
        }
    };

    get_blob(layer, context, &data_handle, fetch_option)
}

fn get_blob(
    layer: &LayerContext,
    context: &CancellationContext,
    data_handle: &str,
    fetch_option: FetchOption,
) -> ApiResponse<Data> {
    let key = cache_key(&layer.catalog, &layer.layer, data_handle);

    if fetch_option != FetchOption::OnlineOnly {
        if let Some(data) = layer.cache.get(&key) {
            tracing::debug!(%key, "data cache hit");
            return Ok(data);
        }
        if fetch_option == FetchOption::CacheOnly {
            return Err(ApiError::not_found(format!(
                "Data for handle {data_handle} is not cached."
            )));
        }
        tracing::debug!(%key, "data cache miss");
    }

    let base_url = api::lookup_api(layer, context, "blob", "v1", fetch_option)?;
    let data = remote_step(context, layer, "blob fetch", |callback| {
        layer
            .apis
            .blob
            .get_blob(&base_url, &layer.layer, data_handle, callback)
    })?;

    layer.cache_put(&key, data.clone(), layer.settings.default_cache_expiry);
    Ok(data)
}
