//! Service endpoint discovery with caching.

use geoplatform_core::{ApiError, ApiResponse, CancellationContext};

use super::{LayerContext, remote_step};
use crate::request::FetchOption;

fn cache_key(catalog: &str, service: &str, version: &str) -> String {
    format!("{catalog}::{service}::{version}::api")
}

/// Base URL of `service` for the layer's catalog.
///
/// A cached endpoint is used unless `fetch_option` is
/// [`FetchOption::OnlineOnly`]; a discovered one is cached for the
/// configured endpoint lifetime.
pub(crate) fn lookup_api(
    layer: &LayerContext,
    context: &CancellationContext,
    service: &str,
    service_version: &str,
    fetch_option: FetchOption,
) -> ApiResponse<String> {
    let key = cache_key(&layer.catalog, service, service_version);

    if fetch_option != FetchOption::OnlineOnly
        && let Some(url) = layer
            .cache
            .get(&key)
            .and_then(|bytes| String::from_utf8(bytes).ok())
    {
        tracing::trace!(%key, "endpoint cache hit");
        return Ok(url);
    }

    let apis = remote_step(context, layer, &format!("{service} lookup"), |callback| {
        layer
            .apis
            .lookup
            .lookup_api(&layer.catalog, service, service_version, callback)
    })?;

    let Some(api) = apis.into_iter().find(|api| api.api == service) else {
        return Err(ApiError::service_unavailable(format!(
            "{service} lookup failed: no {service_version} endpoint for {}",
            layer.catalog
        )));
    };

    layer.cache_put(
        &key,
        api.base_url.clone().into_bytes(),
        Some(layer.settings.api_cache_expiry),
    );
    Ok(api.base_url)
}
