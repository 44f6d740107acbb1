//! Client credentials and authentication settings.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use geoplatform_core::TaskScheduler;
use geoplatform_core::condition::DEFAULT_WAIT_TIMEOUT;

const KEY_ID: &str = "here.access.key.id";
const KEY_SECRET: &str = "here.access.key.secret";
const TOKEN_ENDPOINT_URL: &str = "here.token.endpoint.url";

/// Access key pair identifying a client application.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthenticationCredentials {
    pub key: String,
    pub secret: String,
}

impl AuthenticationCredentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }

    /// Read the key pair from a `credentials.properties` file.
    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, CredentialsError> {
        CredentialsFile::read(path).map(|file| file.credentials)
    }
}

impl fmt::Debug for AuthenticationCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationCredentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Contents of a `credentials.properties` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialsFile {
    pub credentials: AuthenticationCredentials,
    /// Token endpoint the credentials belong to, if the file names one.
    pub token_endpoint_url: Option<String>,
}

impl CredentialsFile {
    pub fn read(path: impl AsRef<Path>) -> Result<Self, CredentialsError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| CredentialsError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(&contents)
    }

    /// Parse `key = value` lines; blank lines and `#` comments are skipped.
    pub fn parse(contents: &str) -> Result<Self, CredentialsError> {
        let mut key = None;
        let mut secret = None;
        let mut token_endpoint_url = None;

        for line in contents.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((name, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().to_string();
            match name.trim() {
                KEY_ID => key = Some(value),
                KEY_SECRET => secret = Some(value),
                TOKEN_ENDPOINT_URL => token_endpoint_url = Some(value),
                _ => {}
            }
        }

        Ok(Self {
            credentials: AuthenticationCredentials {
                key: key.ok_or(CredentialsError::Missing { field: KEY_ID })?,
                secret: secret.ok_or(CredentialsError::Missing { field: KEY_SECRET })?,
            },
            token_endpoint_url,
        })
    }
}

/// Errors that can occur while loading credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialsError {
    /// The file could not be read.
    Io {
        /// The file that failed.
        path: PathBuf,
        /// The error message.
        message: String,
    },
    /// A required property is absent.
    Missing {
        /// Name of the property.
        field: &'static str,
    },
}

impl fmt::Display for CredentialsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, message } => {
                write!(f, "failed to read {}: {message}", path.display())
            }
            Self::Missing { field } => write!(f, "missing property {field}"),
        }
    }
}

impl std::error::Error for CredentialsError {}

/// Configuration of a [`TokenEndpoint`](crate::TokenEndpoint).
#[derive(Clone)]
pub struct Settings {
    /// Full token URL, normally ending in `/oauth2/token`.
    pub token_endpoint_url: String,
    pub credentials: AuthenticationCredentials,
    /// Where token callbacks are delivered; inline when absent.
    pub task_scheduler: Option<Arc<dyn TaskScheduler>>,
    /// Bound of a blocking wait for a token.
    pub request_timeout: Duration,
}

impl Settings {
    pub fn new(token_endpoint_url: impl Into<String>, credentials: AuthenticationCredentials) -> Self {
        Self {
            token_endpoint_url: token_endpoint_url.into(),
            credentials,
            task_scheduler: None,
            request_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("token_endpoint_url", &self.token_endpoint_url)
            .field("credentials", &self.credentials)
            .field("task_scheduler", &self.task_scheduler.is_some())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
