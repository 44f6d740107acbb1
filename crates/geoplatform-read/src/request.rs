//! Data requests and fetch options.

use std::fmt;
use std::str::FromStr;

use geoplatform_core::{ApiError, ApiResponse};

/// How a request uses the cache and the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FetchOption {
    /// Read the cache only; a miss is reported as not found.
    CacheOnly,
    /// Skip the cache read and always go online.
    OnlineOnly,
    /// Read the cache and go online on a miss.
    #[default]
    OnlineIfNotFound,
    /// Answer from the cache and refresh the cache from the network in the
    /// background.
    CacheWithUpdate,
}

impl FetchOption {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CacheOnly => "cache-only",
            Self::OnlineOnly => "online-only",
            Self::OnlineIfNotFound => "online-if-not-found",
            Self::CacheWithUpdate => "cache-with-update",
        }
    }
}

impl fmt::Display for FetchOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown fetch option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFetchOptionError(String);

impl fmt::Display for ParseFetchOptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown fetch option '{}', expected one of cache-only, online-only, online-if-not-found, cache-with-update",
            self.0
        )
    }
}

impl std::error::Error for ParseFetchOptionError {}

impl FromStr for FetchOption {
    type Err = ParseFetchOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cache-only" => Ok(Self::CacheOnly),
            "online-only" => Ok(Self::OnlineOnly),
            "online-if-not-found" => Ok(Self::OnlineIfNotFound),
            "cache-with-update" => Ok(Self::CacheWithUpdate),
            other => Err(ParseFetchOptionError(other.to_string())),
        }
    }
}

/// A request for one partition's data.
///
/// Exactly one of partition id and data handle must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataRequest {
    partition_id: Option<String>,
    data_handle: Option<String>,
    version: Option<i64>,
    fetch_option: FetchOption,
}

impl DataRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_partition_id(mut self, partition_id: impl Into<String>) -> Self {
        self.partition_id = Some(partition_id.into());
        self
    }

    #[must_use]
    pub fn with_data_handle(mut self, data_handle: impl Into<String>) -> Self {
        self.data_handle = Some(data_handle.into());
        self
    }

    /// Pin the layer version, overriding the client's.
    #[must_use]
    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    #[must_use]
    pub fn with_fetch_option(mut self, fetch_option: FetchOption) -> Self {
        self.fetch_option = fetch_option;
        self
    }

    #[must_use]
    pub fn partition_id(&self) -> Option<&str> {
        self.partition_id.as_deref()
    }

    #[must_use]
    pub fn data_handle(&self) -> Option<&str> {
        self.data_handle.as_deref()
    }

    #[must_use]
    pub fn version(&self) -> Option<i64> {
        self.version
    }

    #[must_use]
    pub fn fetch_option(&self) -> FetchOption {
        self.fetch_option
    }

    /// Reject requests naming both or neither of partition id and data
    /// handle.
    pub(crate) fn validate(&self) -> ApiResponse<()> {
        match (&self.partition_id, &self.data_handle) {
            (Some(_), Some(_)) => Err(ApiError::precondition_failed(
                "Both partition id and data handle are set, only one is allowed.",
            )),
            (None, None) => Err(ApiError::precondition_failed(
                "Either partition id or data handle must be set.",
            )),
            _ => Ok(()),
        }
    }
}
