//! Authentication for the geoplatform APIs.
//!
//! Client applications authenticate with an access key pair. The
//! [`TokenEndpoint`] exchanges the key pair for short-lived bearer tokens,
//! and an [`AutoRefreshingToken`] keeps one token fresh for any number of
//! concurrent requests, refreshing it at most once at a time.
//!
//! # Example
//!
//! ```no_run
//! use geoplatform_auth::{AuthenticationCredentials, Settings, TokenEndpoint, TokenRequest};
//! use geoplatform_core::HttpNetwork;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = tokio::runtime::Runtime::new()?;
//! let credentials = AuthenticationCredentials::read_from_file("credentials.properties")?;
//! let settings = Settings::new("https://account.api.here.com/oauth2/token", credentials);
//!
//! let endpoint = TokenEndpoint::new(settings, HttpNetwork::new(runtime.handle().clone()));
//! let token = endpoint.request_token_future(&TokenRequest::default()).wait()?;
//! println!("token valid for {:?}", token.remaining());
//! # Ok(())
//! # }
//! ```

mod auto_refreshing_token;
mod credentials;
mod sign_in;
mod token_endpoint;

pub use auto_refreshing_token::{AutoRefreshingToken, DEFAULT_MINIMUM_VALIDITY, TokenState};
pub use credentials::{AuthenticationCredentials, CredentialsError, CredentialsFile, Settings};
pub use sign_in::{ErrorResponse, HttpSignInClient, SignInCallback, SignInClient, SignInResult};
pub use token_endpoint::{
    DEFAULT_TOKEN_EXPIRY, TokenCallback, TokenEndpoint, TokenRequest, TokenResult,
};
