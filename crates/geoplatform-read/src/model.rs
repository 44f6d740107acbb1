//! Wire types of the platform read APIs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Raw partition payload.
pub type Data = Vec<u8>;

/// Metadata of one partition of a layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    /// Partition id.
    pub partition: String,
    /// Opaque handle the blob service resolves to the payload.
    pub data_handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Reply of a partitions query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partitions {
    pub partitions: Vec<Partition>,
}

/// A service endpoint returned by API lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Api {
    /// Service name, e.g. `query` or `blob`.
    pub api: String,
    pub version: String,
    #[serde(rename = "baseURL")]
    pub base_url: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

/// Reply of a latest-version query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogVersion {
    pub version: i64,
}
