//! In-process fakes of the platform services.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use geoplatform_core::{ApiError, ApiResponse, CancellationToken};
use geoplatform_read::api::{ApiCallback, ApiLookup, BlobApi, MetadataApi, QueryApi};
use geoplatform_read::{Api, ApiClients, Data, Partition, Partitions};

pub const CATALOG: &str = "hrn:here:data::olp-here-test:hereos-internal-test-v2";
pub const LAYER: &str = "testlayer";
pub const VERSION: i64 = 4;

/// How a fake service answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Before the call returns.
    Inline,
    /// From another thread, after a short delay.
    Threaded,
    /// Not at all.
    Never,
}

/// A platform with one catalog and per-service call counters.
pub struct FakePlatform {
    pub lookup_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    pub blob_calls: AtomicUsize,
    pub metadata_calls: AtomicUsize,
    /// Calls whose cancellation token was used.
    pub cancelled_calls: Arc<AtomicUsize>,
    /// Versions requested from the query service.
    pub queried_versions: Mutex<Vec<Option<i64>>>,
    partitions: Mutex<HashMap<String, Partition>>,
    blobs: Mutex<HashMap<String, Data>>,
    failing_services: Mutex<HashSet<String>>,
    blob_reply: Mutex<Reply>,
    reply: Reply,
    latest_version: i64,
    /// Callbacks of calls that never reply, kept alive.
    parked: Mutex<Vec<Box<dyn std::any::Any + Send>>>,
}

impl FakePlatform {
    pub fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            lookup_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
            blob_calls: AtomicUsize::new(0),
            metadata_calls: AtomicUsize::new(0),
            cancelled_calls: Arc::new(AtomicUsize::new(0)),
            queried_versions: Mutex::new(Vec::new()),
            partitions: Mutex::new(HashMap::new()),
            blobs: Mutex::new(HashMap::new()),
            failing_services: Mutex::new(HashSet::new()),
            blob_reply: Mutex::new(reply),
            reply,
            latest_version: VERSION,
            parked: Mutex::new(Vec::new()),
        })
    }

    /// Add a partition and its payload.
    pub fn with_partition(self: Arc<Self>, id: &str, data: &[u8]) -> Arc<Self> {
        let data_handle = format!("handle-{id}");
        self.partitions.lock().unwrap().insert(
            id.to_string(),
            Partition {
                partition: id.to_string(),
                data_handle: data_handle.clone(),
                version: Some(VERSION),
                data_size: None,
                checksum: None,
            },
        );
        self.blobs.lock().unwrap().insert(data_handle, data.to_vec());
        self
    }

    /// Make lookups of `service` fail.
    pub fn fail_lookup(&self, service: &str) {
        self.failing_services.lock().unwrap().insert(service.to_string());
    }

    pub fn set_blob_reply(&self, reply: Reply) {
        *self.blob_reply.lock().unwrap() = reply;
    }

    pub fn clients(self: &Arc<Self>) -> ApiClients {
        ApiClients {
            lookup: self.clone(),
            query: self.clone(),
            blob: self.clone(),
            metadata: self.clone(),
        }
    }

    pub fn calls(&self) -> (usize, usize, usize) {
        (
            self.lookup_calls.load(Ordering::SeqCst),
            self.query_calls.load(Ordering::SeqCst),
            self.blob_calls.load(Ordering::SeqCst),
        )
    }

    fn answer<T: Send + 'static>(
        &self,
        reply: Reply,
        callback: ApiCallback<T>,
        response: ApiResponse<T>,
    ) -> CancellationToken {
        match reply {
            Reply::Inline => callback(response),
            Reply::Threaded => {
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(5));
                    callback(response);
                });
            }
            Reply::Never => self.parked.lock().unwrap().push(Box::new(callback)),
        }
        let cancelled = Arc::clone(&self.cancelled_calls);
        CancellationToken::new(move || {
            cancelled.fetch_add(1, Ordering::SeqCst);
        })
    }
}

impl ApiLookup for FakePlatform {
    fn lookup_api(
        &self,
        catalog: &str,
        service: &str,
        service_version: &str,
        callback: ApiCallback<Vec<Api>>,
    ) -> CancellationToken {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        let response = if self.failing_services.lock().unwrap().contains(service) {
            Err(ApiError::from_http_status(503, "lookup unavailable"))
        } else {
            Ok(vec![Api {
                api: service.to_string(),
                version: service_version.to_string(),
                base_url: format!("https://{service}.example.com/{service}/{service_version}/catalogs/{catalog}"),
                parameters: HashMap::new(),
            }])
        };
        self.answer(self.reply, callback, response)
    }
}

impl QueryApi for FakePlatform {
    fn get_partitions_by_id(
        &self,
        _base_url: &str,
        _layer: &str,
        partition_ids: &[String],
        version: Option<i64>,
        callback: ApiCallback<Partitions>,
    ) -> CancellationToken {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.queried_versions.lock().unwrap().push(version);
        let known = self.partitions.lock().unwrap();
        let partitions = partition_ids
            .iter()
            .filter_map(|id| known.get(id).cloned())
            .collect();
        drop(known);
        self.answer(self.reply, callback, Ok(Partitions { partitions }))
    }
}

impl BlobApi for FakePlatform {
    fn get_blob(
        &self,
        _base_url: &str,
        _layer: &str,
        data_handle: &str,
        callback: ApiCallback<Data>,
    ) -> CancellationToken {
        self.blob_calls.fetch_add(1, Ordering::SeqCst);
        let response = self
            .blobs
            .lock()
            .unwrap()
            .get(data_handle)
            .cloned()
            .ok_or_else(|| ApiError::from_http_status(404, "no such blob"));
        let reply = *self.blob_reply.lock().unwrap();
        self.answer(reply, callback, response)
    }
}

impl MetadataApi for FakePlatform {
    fn get_latest_catalog_version(
        &self,
        _base_url: &str,
        _start_version: i64,
        callback: ApiCallback<i64>,
    ) -> CancellationToken {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.answer(self.reply, callback, Ok(self.latest_version))
    }
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
