//! Access tokens issued by the account service.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use geoplatform_core::{
    ApiError, ApiResponse, CancellableFuture, CancellationToken, ErrorCode, HttpNetwork,
    TaskScheduler, execute_or_schedule,
};

use crate::auto_refreshing_token::AutoRefreshingToken;
use crate::credentials::{AuthenticationCredentials, Settings};
use crate::sign_in::{ErrorResponse, HttpSignInClient, OAUTH2_TOKEN_PATH, SignInClient, SignInResult};

/// Default lifetime requested for a token.
pub const DEFAULT_TOKEN_EXPIRY: Duration = Duration::from_secs(3600);

/// Parameters of a token request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRequest {
    /// Requested lifetime of the token.
    pub expires_in: Duration,
}

impl TokenRequest {
    #[must_use]
    pub fn new(expires_in: Duration) -> Self {
        Self { expires_in }
    }
}

impl Default for TokenRequest {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_EXPIRY)
    }
}

/// A token, or the account service's reason for not issuing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenResult {
    pub access_token: String,
    /// Moment the token stops being accepted.
    pub expiry_time: SystemTime,
    pub http_status: u16,
    pub error_response: Option<ErrorResponse>,
}

impl TokenResult {
    fn from_sign_in(result: SignInResult) -> Self {
        Self {
            access_token: result.access_token,
            expiry_time: SystemTime::now() + result.expires_in,
            http_status: result.status,
            error_response: result.error_response,
        }
    }

    /// Whether the service issued a usable token.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.http_status == 200 && !self.access_token.is_empty()
    }

    /// Time left until expiry; zero once expired.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.expiry_time
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining() == Duration::ZERO
    }

    /// Describe a non-success result as an authentication failure.
    pub(crate) fn to_error(&self) -> ApiError {
        let message = self
            .error_response
            .as_ref()
            .map_or_else(|| "Token request rejected.".to_string(), |e| e.message.clone());
        let mut error = ApiError::from_http_status(self.http_status, message);
        if !matches!(
            error.code,
            ErrorCode::ServiceUnavailable | ErrorCode::RequestTimeout
        ) {
            error.code = ErrorCode::AuthenticationFailure;
        }
        error
    }
}

/// Receives the outcome of a token request.
pub type TokenCallback = Box<dyn FnOnce(ApiResponse<TokenResult>) + Send>;

struct EndpointInner {
    client: Arc<dyn SignInClient>,
    credentials: AuthenticationCredentials,
    task_scheduler: Option<Arc<dyn TaskScheduler>>,
    request_timeout: Duration,
}

/// Requests access tokens with a client's credentials.
///
/// Clones share the same sign-in client.
#[derive(Clone)]
pub struct TokenEndpoint {
    inner: Arc<EndpointInner>,
}

impl TokenEndpoint {
    /// Create an endpoint signing in over HTTP.
    ///
    /// The sign-in client appends `/oauth2/token` itself, so the suffix is
    /// stripped from the configured URL.
    #[must_use]
    pub fn new(settings: Settings, network: HttpNetwork) -> Self {
        let base_url = strip_token_path(&settings.token_endpoint_url);
        let client = Arc::new(HttpSignInClient::new(base_url, network));
        Self::with_sign_in_client(settings, client)
    }

    /// Create an endpoint using a custom sign-in client.
    #[must_use]
    pub fn with_sign_in_client(settings: Settings, client: Arc<dyn SignInClient>) -> Self {
        Self {
            inner: Arc::new(EndpointInner {
                client,
                credentials: settings.credentials,
                task_scheduler: settings.task_scheduler,
                request_timeout: settings.request_timeout,
            }),
        }
    }

    /// Request a new token.
    ///
    /// `callback` runs once, on the configured scheduler when there is one.
    pub fn request_token(&self, request: &TokenRequest, callback: TokenCallback) -> CancellationToken {
        let scheduler = self.inner.task_scheduler.clone();
        tracing::debug!(expires_in = ?request.expires_in, "requesting token");

        self.inner.client.sign_in(
            &self.inner.credentials,
            request.expires_in,
            Box::new(move |response| {
                let response = response.map(TokenResult::from_sign_in);
                execute_or_schedule(scheduler.as_ref(), move || callback(response));
            }),
        )
    }

    /// Request a new token as an awaitable result.
    #[must_use]
    pub fn request_token_future(&self, request: &TokenRequest) -> CancellableFuture<TokenResult> {
        CancellableFuture::from_callback(|callback| self.request_token(request, callback))
    }

    /// A token handle that refreshes itself before expiry.
    #[must_use]
    pub fn request_auto_refreshing_token(&self, request: TokenRequest) -> AutoRefreshingToken {
        AutoRefreshingToken::new(self.clone(), request)
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }
}

fn strip_token_path(url: &str) -> String {
    if let Some(position) = url.find(OAUTH2_TOKEN_PATH) {
        let mut stripped = url.to_string();
        stripped.replace_range(position..position + OAUTH2_TOKEN_PATH.len(), "");
        stripped
    } else {
        tracing::error!(
            url,
            "expected '/oauth2/token' in the token endpoint URL; only standard OAuth2 token endpoints are supported"
        );
        url.to_string()
    }
}
