//! Client-credentials sign-in against the account service.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use geoplatform_core::network::NetworkCallback;
use geoplatform_core::{
    ApiError, ApiResponse, CancellationToken, HttpNetwork, NetworkRequest, NetworkResponse,
};

use crate::credentials::AuthenticationCredentials;

/// Path appended to the account service base URL.
pub(crate) const OAUTH2_TOKEN_PATH: &str = "/oauth2/token";

/// Error details returned by the account service with a non-success status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorResponse {
    pub error_code: Option<u32>,
    pub error_id: Option<String>,
    pub message: String,
}

/// Outcome of a sign-in that reached the account service.
///
/// A reply with a non-success `status` carries its details in
/// `error_response` and no usable token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInResult {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: Duration,
    pub status: u16,
    pub error_response: Option<ErrorResponse>,
}

/// Receives the outcome of a sign-in.
pub type SignInCallback = Box<dyn FnOnce(ApiResponse<SignInResult>) + Send>;

/// The authentication endpoint.
pub trait SignInClient: Send + Sync {
    /// Exchange `credentials` for an access token valid for `expires_in`.
    fn sign_in(
        &self,
        credentials: &AuthenticationCredentials,
        expires_in: Duration,
        callback: SignInCallback,
    ) -> CancellationToken;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInBody {
    grant_type: &'static str,
    expires_in: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBody {
    access_token: String,
    #[serde(default)]
    token_type: String,
    expires_in: u64,
}

/// Signs in over HTTP with basic authentication.
#[derive(Debug, Clone)]
pub struct HttpSignInClient {
    base_url: String,
    network: HttpNetwork,
}

impl HttpSignInClient {
    /// Create a client for the account service at `base_url`.
    ///
    /// The token path is appended to `base_url`.
    pub fn new(base_url: impl Into<String>, network: HttpNetwork) -> Self {
        Self {
            base_url: base_url.into(),
            network,
        }
    }
}

impl SignInClient for HttpSignInClient {
    fn sign_in(
        &self,
        credentials: &AuthenticationCredentials,
        expires_in: Duration,
        callback: SignInCallback,
    ) -> CancellationToken {
        let url = format!("{}{OAUTH2_TOKEN_PATH}", self.base_url);
        let body = SignInBody {
            grant_type: "client_credentials",
            expires_in: expires_in.as_secs(),
        };
        let body = match serde_json::to_vec(&body) {
            Ok(body) => body,
            Err(e) => {
                callback(Err(ApiError::invalid_response(format!(
                    "failed to encode sign-in request: {e}"
                ))));
                return CancellationToken::default();
            }
        };

        let request = NetworkRequest::post(url, body)
            .with_header("Content-Type", "application/json")
            .with_basic_auth(&credentials.key, &credentials.secret);

        let on_response: NetworkCallback =
            Box::new(move |response| callback(response.and_then(parse_sign_in_response)));
        self.network.send(request, on_response)
    }
}

/// Decode the account service reply.
pub(crate) fn parse_sign_in_response(response: NetworkResponse) -> ApiResponse<SignInResult> {
    if response.is_success() {
        let body: TokenBody = serde_json::from_slice(&response.body).map_err(|e| {
            ApiError::invalid_response(format!("failed to decode token response: {e}"))
        })?;
        return Ok(SignInResult {
            access_token: body.access_token,
            token_type: body.token_type,
            expires_in: Duration::from_secs(body.expires_in),
            status: response.status,
            error_response: None,
        });
    }

    // Error bodies are informative only; an unreadable one still yields a
    // result carrying the status.
    let error_response = serde_json::from_slice::<ErrorResponse>(&response.body)
        .unwrap_or_else(|_| ErrorResponse {
            message: String::from_utf8_lossy(&response.body).into_owned(),
            ..ErrorResponse::default()
        });

    Ok(SignInResult {
        access_token: String::new(),
        token_type: String::new(),
        expires_in: Duration::ZERO,
        status: response.status,
        error_response: Some(error_response),
    })
}
