//! Catalog version resolution.

use geoplatform_core::{ApiError, ApiResponse, CancellationContext};

use super::{LayerContext, api, remote_step};
use crate::request::FetchOption;

fn cache_key(catalog: &str) -> String {
    format!("{catalog}::latestVersion")
}

pub(crate) fn cached_latest_version(layer: &LayerContext) -> Option<i64> {
    layer
        .cache
        .get(&cache_key(&layer.catalog))
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|text| text.parse().ok())
}

/// The catalog's latest version.
///
/// [`FetchOption::CacheOnly`] answers from the last version seen; every
/// other option asks the metadata service and remembers the answer.
pub(crate) fn get_latest_version(
    layer: &LayerContext,
    context: &CancellationContext,
    fetch_option: FetchOption,
) -> ApiResponse<i64> {
    if fetch_option == FetchOption::CacheOnly {
        return cached_latest_version(layer).ok_or_else(|| {
            ApiError::not_found(format!("No cached version of catalog {}.", layer.catalog))
        });
    }

    let base_url = api::lookup_api(layer, context, "metadata", "v1", fetch_option)?;
    let version = remote_step(context, layer, "latest version", |callback| {
        layer
            .apis
            .metadata
            .get_latest_catalog_version(&base_url, -1, callback)
    })?;

    tracing::debug!(catalog = %layer.catalog, version, "resolved latest version");
    layer.cache_put(
        &cache_key(&layer.catalog),
        version.to_string().into_bytes(),
        None,
    );
    Ok(version)
}
