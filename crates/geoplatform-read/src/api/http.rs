//! HTTP implementation of the platform services.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;

use geoplatform_core::network::NetworkCallback;
use geoplatform_core::{
    ApiError, ApiResponse, CancellationToken, HttpNetwork, NetworkRequest, NetworkResponse,
    TokenProvider,
};

use super::{ApiCallback, ApiLookup, BlobApi, MetadataApi, QueryApi};
use crate::model::{Api, CatalogVersion, Data, Partitions};

/// Base URL of the public API lookup service.
pub const DEFAULT_LOOKUP_URL: &str = "https://api-lookup.data.api.platform.here.com/lookup/v1";

/// Talks to the platform services over HTTP.
///
/// Every request carries the bearer token supplied by the token provider,
/// when one is configured.
#[derive(Clone)]
pub struct HttpApis {
    network: HttpNetwork,
    lookup_url: String,
    token_provider: Option<TokenProvider>,
}

impl HttpApis {
    /// Create the services on top of `network`, using the public lookup
    /// service and no authentication.
    #[must_use]
    pub fn new(network: HttpNetwork) -> Self {
        Self {
            network,
            lookup_url: DEFAULT_LOOKUP_URL.to_string(),
            token_provider: None,
        }
    }

    /// Set a custom lookup service URL.
    #[must_use]
    pub fn with_lookup_url(mut self, lookup_url: impl Into<String>) -> Self {
        self.lookup_url = lookup_url.into();
        self
    }

    #[must_use]
    pub fn with_token_provider(mut self, token_provider: TokenProvider) -> Self {
        self.token_provider = Some(token_provider);
        self
    }

    /// GET `url` and hand the successful body to `decode`.
    ///
    /// With a token provider the request is sent once the provider answers.
    /// Cancelling before that answers `callback` with
    /// [`ApiError::cancelled`] and no request is sent.
    fn get<T, D>(&self, url: String, decode: D, callback: ApiCallback<T>) -> CancellationToken
    where
        T: Send + 'static,
        D: FnOnce(Vec<u8>) -> ApiResponse<T> + Send + 'static,
    {
        let Some(provider) = &self.token_provider else {
            return self.send(url, None, decode, callback);
        };

        let pending = Arc::new(Mutex::new(PendingSend {
            callback: Some(callback),
            request: None,
            cancelled: false,
        }));

        let apis = self.clone();
        let on_token = Arc::clone(&pending);
        provider(Box::new(move |token: ApiResponse<Option<String>>| {
            let Some(callback) = lock(&on_token).callback.take() else {
                tracing::debug!(%url, "cancelled while waiting for a token");
                return;
            };
            let token = match token {
                Ok(token) => token,
                Err(error) => return callback(Err(error)),
            };

            let request = apis.send(url, token, decode, callback);
            let mut pending = lock(&on_token);
            if pending.cancelled {
                drop(pending);
                request.cancel();
            } else {
                pending.request = Some(request);
            }
        }));

        CancellationToken::new(move || {
            let (callback, request) = {
                let mut pending = lock(&pending);
                pending.cancelled = true;
                (pending.callback.take(), pending.request.take())
            };
            if let Some(request) = request {
                request.cancel();
            }
            if let Some(callback) = callback {
                callback(Err(ApiError::cancelled()));
            }
        })
    }

    fn send<T, D>(
        &self,
        url: String,
        token: Option<String>,
        decode: D,
        callback: ApiCallback<T>,
    ) -> CancellationToken
    where
        T: Send + 'static,
        D: FnOnce(Vec<u8>) -> ApiResponse<T> + Send + 'static,
    {
        tracing::debug!(%url, authenticated = token.is_some(), "fetching");

        let request = NetworkRequest::get(url).with_bearer_token(token);
        let on_response: NetworkCallback = Box::new(move |response| {
            callback(response.and_then(NetworkResponse::into_result).and_then(decode));
        });
        self.network.send(request, on_response)
    }
}

/// A request waiting for its bearer token.
struct PendingSend<T> {
    /// Taken by whichever comes first: the token or a cancel.
    callback: Option<ApiCallback<T>>,
    request: Option<CancellationToken>,
    cancelled: bool,
}

fn lock<T>(pending: &Mutex<PendingSend<T>>) -> MutexGuard<'_, PendingSend<T>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

fn decode_json<T: DeserializeOwned>(context: &'static str) -> impl FnOnce(Vec<u8>) -> ApiResponse<T> {
    move |body| {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::invalid_response(format!("failed to decode {context}: {e}")))
    }
}

impl ApiLookup for HttpApis {
    fn lookup_api(
        &self,
        catalog: &str,
        service: &str,
        service_version: &str,
        callback: ApiCallback<Vec<Api>>,
    ) -> CancellationToken {
        let url = format!(
            "{}/resources/{}/apis/{}/{}",
            self.lookup_url,
            urlencoding::encode(catalog),
            service,
            service_version
        );
        self.get(url, decode_json("api lookup"), callback)
    }
}

impl QueryApi for HttpApis {
    fn get_partitions_by_id(
        &self,
        base_url: &str,
        layer: &str,
        partition_ids: &[String],
        version: Option<i64>,
        callback: ApiCallback<Partitions>,
    ) -> CancellationToken {
        let mut query: Vec<String> = partition_ids
            .iter()
            .map(|id| format!("partition={}", urlencoding::encode(id)))
            .collect();
        if let Some(version) = version {
            query.push(format!("version={version}"));
        }
        let url = format!(
            "{base_url}/layers/{}/partitions?{}",
            urlencoding::encode(layer),
            query.join("&")
        );
        self.get(url, decode_json("partitions"), callback)
    }
}

impl BlobApi for HttpApis {
    fn get_blob(
        &self,
        base_url: &str,
        layer: &str,
        data_handle: &str,
        callback: ApiCallback<Data>,
    ) -> CancellationToken {
        let url = format!(
            "{base_url}/layers/{}/data/{}",
            urlencoding::encode(layer),
            urlencoding::encode(data_handle)
        );
        self.get(url, Ok, callback)
    }
}

impl MetadataApi for HttpApis {
    fn get_latest_catalog_version(
        &self,
        base_url: &str,
        start_version: i64,
        callback: ApiCallback<i64>,
    ) -> CancellationToken {
        let url = format!("{base_url}/versions/latest?startVersion={start_version}");
        let decode = |body: Vec<u8>| {
            decode_json::<CatalogVersion>("catalog version")(body).map(|latest| latest.version)
        };
        self.get(url, decode, callback)
    }
}

impl fmt::Debug for HttpApis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpApis")
            .field("lookup_url", &self.lookup_url)
            .field("authenticated", &self.token_provider.is_some())
            .finish_non_exhaustive()
    }
}
