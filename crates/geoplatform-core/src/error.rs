//! Error types shared by the geoplatform client crates.

use std::fmt;

/// Result type for operations that talk to the platform.
pub type ApiResponse<T> = std::result::Result<T, ApiError>;

/// Classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The failure could not be classified.
    Unknown,
    /// The operation was cancelled through its cancellation token.
    Cancelled,
    /// A bridged wait elapsed without the operation being cancelled.
    RequestTimeout,
    /// A discovery or remote-service call failed.
    ServiceUnavailable,
    /// The request parameters are insufficient or contradictory.
    PreconditionFailed,
    /// The requested resource is not available (e.g. cache-only miss).
    NotFound,
    /// Credentials were rejected or a token refresh failed.
    AuthenticationFailure,
    /// The credentials are valid but lack permission for the resource.
    AccessDenied,
    /// The service rejected the request as malformed.
    BadRequest,
    /// The transport could not reach the service.
    NetworkConnection,
    /// The service replied with a payload that could not be understood.
    InvalidResponse,
}

impl ErrorCode {
    /// Map an HTTP status code to an error code.
    #[must_use]
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::AuthenticationFailure,
            403 => Self::AccessDenied,
            404 => Self::NotFound,
            408 | 504 => Self::RequestTimeout,
            429 | 500..=599 => Self::ServiceUnavailable,
            _ => Self::Unknown,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Cancelled => "cancelled",
            Self::RequestTimeout => "request timeout",
            Self::ServiceUnavailable => "service unavailable",
            Self::PreconditionFailed => "precondition failed",
            Self::NotFound => "not found",
            Self::AuthenticationFailure => "authentication failure",
            Self::AccessDenied => "access denied",
            Self::BadRequest => "bad request",
            Self::NetworkConnection => "network connection",
            Self::InvalidResponse => "invalid response",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error returned by a platform request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// What kind of failure occurred.
    pub code: ErrorCode,
    /// Human readable description.
    pub message: String,
    /// Whether repeating the request may succeed.
    pub retryable: bool,
    /// HTTP status, when the failure came from an HTTP reply.
    pub http_status: Option<u16>,
}

impl ApiError {
    /// Create an error with an explicit retry hint.
    pub fn new(code: ErrorCode, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code,
            message: message.into(),
            retryable,
            http_status: None,
        }
    }

    /// The error delivered for cancelled operations.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "Operation cancelled.", false)
    }

    /// The error delivered when a bridged wait times out.
    #[must_use]
    pub fn request_timeout() -> Self {
        Self::new(ErrorCode::RequestTimeout, "Network request timed out.", true)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message, true)
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PreconditionFailed, message, false)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message, false)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidResponse, message, false)
    }

    /// Build an error from a non-success HTTP reply.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let code = ErrorCode::from_http_status(status);
        let retryable = matches!(
            code,
            ErrorCode::RequestTimeout | ErrorCode::ServiceUnavailable
        );
        Self {
            code,
            message: message.into(),
            retryable,
            http_status: Some(status),
        }
    }

    /// Whether this error reports a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::Cancelled
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.http_status {
            Some(status) => write!(f, "{} (http {status}): {}", self.code, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

/// A cache operation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheError {
    /// The operation that failed.
    pub operation: &'static str,
    /// The error message.
    pub message: String,
}

impl CacheError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache {} failed: {}", self.operation, self.message)
    }
}

impl std::error::Error for CacheError {}
