//! HTTP transport used by the platform API implementations.
//!
//! Requests run on a Tokio runtime and report back through a callback, so
//! the blocking bridge in [`crate::condition`] can wait on them from a
//! worker thread. Cancelling a request aborts the Tokio task, which also
//! aborts the in-flight HTTP request.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::error::{ApiError, ApiResponse, ErrorCode};

/// HTTP method of a [`NetworkRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request to send over the network.
#[derive(Debug, Clone)]
pub struct NetworkRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub basic_auth: Option<(String, String)>,
    pub bearer_token: Option<String>,
}

impl NetworkRequest {
    /// A `GET` request for `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            basic_auth: None,
            bearer_token: None,
        }
    }

    /// A `POST` request for `url` with `body`.
    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            body: Some(body),
            method: Method::Post,
            ..Self::get(url)
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((user.into(), password.into()));
        self
    }

    #[must_use]
    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }
}

/// A reply received from the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl NetworkResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-success reply into an [`ApiError`].
    pub fn into_result(self) -> ApiResponse<Vec<u8>> {
        if self.is_success() {
            Ok(self.body)
        } else {
            let message = String::from_utf8_lossy(&self.body).into_owned();
            Err(ApiError::from_http_status(self.status, message))
        }
    }
}

/// Callback receiving the outcome of a network request.
pub type NetworkCallback = Box<dyn FnOnce(ApiResponse<NetworkResponse>) + Send>;

/// HTTP client driving requests on a Tokio runtime.
#[derive(Clone)]
pub struct HttpNetwork {
    http: reqwest::Client,
    runtime: tokio::runtime::Handle,
    timeout: Option<Duration>,
}

impl HttpNetwork {
    /// Create a transport spawning its requests on `runtime`.
    #[must_use]
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        Self {
            http: reqwest::Client::new(),
            runtime,
            timeout: None,
        }
    }

    /// Create a transport with a custom HTTP client.
    #[must_use]
    pub fn with_http(http: reqwest::Client, runtime: tokio::runtime::Handle) -> Self {
        Self {
            http,
            runtime,
            timeout: None,
        }
    }

    /// Set a transport-level timeout for each request.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Send `request` and report the outcome to `callback` exactly once.
    ///
    /// Cancelling the returned token before the reply arrives aborts the
    /// request and reports [`ApiError::cancelled`].
    pub fn send(&self, request: NetworkRequest, callback: NetworkCallback) -> CancellationToken {
        let callback = Arc::new(Mutex::new(Some(callback)));
        let builder = self.build(&request);
        let url = request.url;

        let deliver = {
            let callback = Arc::clone(&callback);
            move |response: ApiResponse<NetworkResponse>| {
                let callback = callback
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(callback) = callback {
                    callback(response);
                }
            }
        };

        let on_reply = deliver.clone();
        let task = self.runtime.spawn(async move {
            tracing::debug!(url = %url, "sending request");
            on_reply(execute(builder, &url).await);
        });
        let abort = task.abort_handle();

        CancellationToken::new(move || {
            abort.abort();
            deliver(Err(ApiError::cancelled()));
        })
    }

    fn build(&self, request: &NetworkRequest) -> reqwest::RequestBuilder {
        let mut builder = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::Post => self.http.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some((user, password)) = &request.basic_auth {
            builder = builder.basic_auth(user, Some(password));
        }
        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }
}

async fn execute(builder: reqwest::RequestBuilder, url: &str) -> ApiResponse<NetworkResponse> {
    let response = builder.send().await.map_err(|e| transport_error(url, &e))?;
    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .map_err(|e| transport_error(url, &e))?;

    Ok(NetworkResponse {
        status,
        body: body.to_vec(),
    })
}

fn transport_error(url: &str, error: &reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::request_timeout()
    } else {
        ApiError::new(
            ErrorCode::NetworkConnection,
            format!("http request to {url} failed: {error}"),
            true,
        )
    }
}

impl fmt::Debug for HttpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpNetwork")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_response_into_result() {
        let ok = NetworkResponse {
            status: 200,
            body: b"abc".to_vec(),
        };
        assert_eq!(ok.into_result(), Ok(b"abc".to_vec()));

        let failed = NetworkResponse {
            status: 503,
            body: b"down".to_vec(),
        };
        let error = failed.into_result().unwrap_err();
        assert_eq!(error.code, ErrorCode::ServiceUnavailable);
        assert_eq!(error.http_status, Some(503));
        assert_eq!(error.message, "down");
    }

    #[test]
    fn test_request_builders() {
        let request = NetworkRequest::post("http://localhost/token", b"{}".to_vec())
            .with_header("Content-Type", "application/json")
            .with_basic_auth("key", "secret");
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.body.as_deref(), Some(&b"{}"[..]));
        assert!(request.bearer_token.is_none());
    }

    #[test]
    fn test_cancel_delivers_cancelled_once() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let network = HttpNetwork::new(runtime.handle().clone());
        let (tx, rx) = mpsc::channel();

        // Port 9 (discard) on a non-routable address keeps the connect pending.
        let token = network.send(
            NetworkRequest::get("http://10.255.255.1:9/"),
            Box::new(move |response| {
                let _ = tx.send(response);
            }),
        );
        token.cancel();
        token.cancel();

        // Without network access the connect may fail before the cancel
        // lands; either way exactly one outcome is reported.
        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(first.is_err());
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
