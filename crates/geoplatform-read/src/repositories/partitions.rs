//! Partition metadata lookup.

use geoplatform_core::{ApiError, ApiResponse, CancellationContext};

use super::{LayerContext, api, remote_step};
use crate::model::Partition;
use crate::request::FetchOption;

pub(crate) fn cache_key(catalog: &str, layer: &str, partition_id: &str, version: i64) -> String {
    format!("{catalog}::{layer}::{partition_id}::{version}::partition")
}

pub(crate) fn cached_partition(
    layer: &LayerContext,
    partition_id: &str,
    version: i64,
) -> Option<Partition> {
    let key = cache_key(&layer.catalog, &layer.layer, partition_id, version);
    let bytes = layer.cache.get(&key)?;
    match serde_json::from_slice(&bytes) {
        Ok(partition) => Some(partition),
        Err(e) => {
            tracing::warn!(%key, error = %e, "discarding unreadable cached partition");
            None
        }
    }
}

/// Metadata of one partition at `version`.
///
/// `Ok(None)` means the query service confirmed the partition does not
/// exist. A cache-only miss is reported as not found.
pub(crate) fn get_partition_by_id(
    layer: &LayerContext,
    context: &CancellationContext,
    partition_id: &str,
    version: i64,
    fetch_option: FetchOption,
) -> ApiResponse<Option<Partition>> {
    if fetch_option != FetchOption::OnlineOnly {
        if let Some(partition) = cached_partition(layer, partition_id, version) {
            tracing::debug!(partition = partition_id, version, "partition cache hit");
            return Ok(Some(partition));
        }
        if fetch_option == FetchOption::CacheOnly {
            return Err(ApiError::not_found(format!(
                "Partition {partition_id} is not cached."
            )));
        }
    }

    let base_url = api::lookup_api(layer, context, "query", "v1", fetch_option)?;
    let ids = [partition_id.to_string()];
    let partitions = remote_step(context, layer, "partitions query", |callback| {
        layer
            .apis
            .query
            .get_partitions_by_id(&base_url, &layer.layer, &ids, Some(version), callback)
    })?;

    let Some(partition) = partitions
        .partitions
        .into_iter()
        .find(|partition| partition.partition == partition_id)
    else {
        tracing::debug!(partition = partition_id, version, "partition does not exist");
        return Ok(None);
    };

    match serde_json::to_vec(&partition) {
        Ok(bytes) => layer.cache_put(
            &cache_key(&layer.catalog, &layer.layer, partition_id, version),
            bytes,
            layer.settings.default_cache_expiry,
        ),
        Err(e) => tracing::warn!(error = %e, "failed to encode partition for the cache"),
    }
    Ok(Some(partition))
}
