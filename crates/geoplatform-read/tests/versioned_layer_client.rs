//! End-to-end behavior of `VersionedLayerClient` against fake services.

mod common;

use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{CATALOG, FakePlatform, LAYER, Reply, VERSION};
use geoplatform_core::condition::ResponseCallback;
use geoplatform_core::scheduler::Task;
use geoplatform_core::{
    ApiResponse, CacheError, ClientSettings, ErrorCode, HttpNetwork, KeyValueCache, MemoryCache,
    TaskScheduler, ThreadPoolTaskScheduler,
};
use geoplatform_read::{
    ApiClients, Data, DataCallback, DataRequest, FetchOption, HttpApis, VersionedLayerClient,
};

fn client(platform: &Arc<FakePlatform>, settings: ClientSettings) -> VersionedLayerClient {
    common::init_logging();
    VersionedLayerClient::new(CATALOG, LAYER, Some(VERSION), settings, platform.clients())
}

fn partition(id: &str, fetch_option: FetchOption) -> DataRequest {
    DataRequest::new()
        .with_partition_id(id)
        .with_fetch_option(fetch_option)
}

fn collector() -> (
    impl Fn() -> DataCallback,
    mpsc::Receiver<ApiResponse<Data>>,
) {
    let (tx, rx) = mpsc::channel();
    let make = move || -> DataCallback {
        let tx = tx.clone();
        Box::new(move |result| {
            let _ = tx.send(result);
        })
    };
    (make, rx)
}

/// Holds tasks until the test runs them.
#[derive(Default)]
struct Parked(Mutex<Vec<Task>>);

impl Parked {
    fn run_all(&self) {
        let tasks = std::mem::take(&mut *self.0.lock().unwrap());
        for task in tasks {
            task();
        }
    }
}

impl TaskScheduler for Parked {
    fn schedule_task(&self, task: Task) {
        self.0.lock().unwrap().push(task);
    }
}

/// A cache whose writes always fail.
struct ReadOnlyCache;

impl KeyValueCache for ReadOnlyCache {
    fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    fn put(&self, _key: &str, _value: Vec<u8>, _expiry: Option<Duration>) -> Result<(), CacheError> {
        Err(CacheError::new("put", "read-only"))
    }

    fn contains(&self, _key: &str) -> bool {
        false
    }

    fn remove(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[test]
fn test_online_only_runs_full_chain() {
    let platform = FakePlatform::new(Reply::Threaded).with_partition("1", b"payload");
    let cache = Arc::new(MemoryCache::new());
    let client = client(&platform, ClientSettings::default().with_cache(cache.clone()));

    let data = client
        .get_data_future(partition("1", FetchOption::OnlineOnly))
        .wait()
        .unwrap();

    assert_eq!(data, b"payload");
    // Query lookup, partitions query, blob lookup, blob fetch.
    assert_eq!(platform.calls(), (2, 1, 1));
    assert_eq!(*platform.queried_versions.lock().unwrap(), vec![Some(VERSION)]);

    assert!(cache.contains(&format!("{CATALOG}::{LAYER}::1::{VERSION}::partition")));
    assert_eq!(
        cache.get(&format!("{CATALOG}::{LAYER}::handle-1::Data")),
        Some(b"payload".to_vec())
    );
    assert!(cache.contains(&format!("{CATALOG}::query::v1::api")));
    assert!(cache.contains(&format!("{CATALOG}::blob::v1::api")));
}

#[test]
fn test_missing_partition_yields_empty_data() {
    let platform = FakePlatform::new(Reply::Inline).with_partition("1", b"payload");
    let client = client(&platform, ClientSettings::default());

    let data = client
        .get_data_future(partition("269", FetchOption::OnlineOnly))
        .wait()
        .unwrap();

    assert!(data.is_empty());
    assert_eq!(platform.calls(), (1, 1, 0));
}

#[test]
fn test_query_lookup_failure_stops_chain() {
    let platform = FakePlatform::new(Reply::Inline).with_partition("1", b"payload");
    platform.fail_lookup("query");
    let client = client(&platform, ClientSettings::default());

    let error = client
        .get_data_future(partition("1", FetchOption::OnlineOnly))
        .wait()
        .unwrap_err();

    assert_eq!(error.code, ErrorCode::ServiceUnavailable);
    assert!(error.retryable);
    assert_eq!(platform.calls(), (1, 0, 0));
}

#[test]
fn test_blob_failure_is_service_unavailable() {
    let platform = FakePlatform::new(Reply::Inline);
    let client = client(&platform, ClientSettings::default());

    let error = client
        .get_data_future(DataRequest::new().with_data_handle("unknown"))
        .wait()
        .unwrap_err();

    assert_eq!(error.code, ErrorCode::ServiceUnavailable);
    assert_eq!(error.http_status, Some(404));
    assert!(error.retryable);
}

#[test]
fn test_blob_wait_times_out() {
    let platform = FakePlatform::new(Reply::Inline).with_partition("1", b"payload");
    platform.set_blob_reply(Reply::Never);
    let client = client(
        &platform,
        ClientSettings::default().with_request_timeout(Duration::from_millis(50)),
    );

    let error = client
        .get_data_future(partition("1", FetchOption::OnlineOnly))
        .wait()
        .unwrap_err();

    assert_eq!(error.code, ErrorCode::RequestTimeout);
    assert!(error.retryable);
    assert_eq!(platform.calls(), (2, 1, 1));
}

#[test]
fn test_cache_only_miss_is_not_found() {
    let platform = FakePlatform::new(Reply::Inline).with_partition("1", b"payload");
    let client = client(&platform, ClientSettings::default());

    let error = client
        .get_data_future(partition("1", FetchOption::CacheOnly))
        .wait()
        .unwrap_err();

    assert_eq!(error.code, ErrorCode::NotFound);
    assert_eq!(platform.calls(), (0, 0, 0));
}

#[test]
fn test_online_if_not_found_uses_cache() {
    let platform = FakePlatform::new(Reply::Inline).with_partition("1", b"payload");
    let client = client(&platform, ClientSettings::default());

    for _ in 0..3 {
        let data = client
            .get_data_future(partition("1", FetchOption::OnlineIfNotFound))
            .wait()
            .unwrap();
        assert_eq!(data, b"payload");
    }
    assert_eq!(platform.calls(), (2, 1, 1));

    let cached = client
        .get_data_future(partition("1", FetchOption::CacheOnly))
        .wait()
        .unwrap();
    assert_eq!(cached, b"payload");
}

#[test]
fn test_online_only_skips_cached_endpoints() {
    let platform = FakePlatform::new(Reply::Inline).with_partition("1", b"payload");
    let client = client(&platform, ClientSettings::default());

    for _ in 0..2 {
        client
            .get_data_future(partition("1", FetchOption::OnlineOnly))
            .wait()
            .unwrap();
    }
    assert_eq!(platform.calls(), (4, 2, 2));
}

#[test]
fn test_cache_with_update_refreshes_in_background() {
    let platform = FakePlatform::new(Reply::Inline).with_partition("1", b"payload");
    let client = client(&platform, ClientSettings::default());
    let (make, rx) = collector();

    client.get_data(partition("1", FetchOption::CacheWithUpdate), make());

    // The caller gets the (empty) cache's answer once.
    let error = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap_err();
    assert_eq!(error.code, ErrorCode::NotFound);
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

    // The background half filled the cache.
    assert_eq!(platform.calls(), (2, 1, 1));
    client.get_data(partition("1", FetchOption::CacheOnly), make());
    assert_eq!(rx.recv().unwrap().unwrap(), b"payload");
}

#[test]
fn test_cache_write_failure_is_ignored() {
    let platform = FakePlatform::new(Reply::Inline).with_partition("1", b"payload");
    let client = client(
        &platform,
        ClientSettings::default().with_cache(Arc::new(ReadOnlyCache)),
    );

    let data = client
        .get_data_future(partition("1", FetchOption::OnlineOnly))
        .wait()
        .unwrap();
    assert_eq!(data, b"payload");
}

#[test]
fn test_partition_and_handle_are_exclusive() {
    let platform = FakePlatform::new(Reply::Inline).with_partition("1", b"payload");
    let client = client(&platform, ClientSettings::default());

    let both = client
        .get_data_future(
            DataRequest::new()
                .with_partition_id("1")
                .with_data_handle("handle-1"),
        )
        .wait()
        .unwrap_err();
    assert_eq!(both.code, ErrorCode::PreconditionFailed);

    let neither = client
        .get_data_future(DataRequest::new())
        .wait()
        .unwrap_err();
    assert_eq!(neither.code, ErrorCode::PreconditionFailed);
    assert_eq!(platform.calls(), (0, 0, 0));
}

#[test]
fn test_data_handle_skips_partition_query() {
    let platform = FakePlatform::new(Reply::Inline).with_partition("1", b"payload");
    let client = client(&platform, ClientSettings::default());

    let data = client
        .get_data_future(DataRequest::new().with_data_handle("handle-1"))
        .wait()
        .unwrap();

    assert_eq!(data, b"payload");
    assert_eq!(platform.calls(), (1, 0, 1));
}

#[test]
fn test_latest_version_is_resolved() {
    let platform = FakePlatform::new(Reply::Inline).with_partition("1", b"payload");
    let client = VersionedLayerClient::new(
        CATALOG,
        LAYER,
        None,
        ClientSettings::default(),
        platform.clients(),
    );

    client
        .get_data_future(partition("1", FetchOption::OnlineIfNotFound))
        .wait()
        .unwrap();
    assert_eq!(platform.metadata_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*platform.queried_versions.lock().unwrap(), vec![Some(VERSION)]);

    // A request pinning its version does not ask for the latest one.
    client
        .get_data_future(partition("1", FetchOption::OnlineIfNotFound).with_version(VERSION))
        .wait()
        .unwrap();
    assert_eq!(platform.metadata_calls.load(Ordering::SeqCst), 1);

    // Cache-only requests use the version seen last.
    let cached = client
        .get_data_future(partition("1", FetchOption::CacheOnly))
        .wait()
        .unwrap();
    assert_eq!(cached, b"payload");
    assert_eq!(platform.metadata_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cancel_before_start_issues_no_calls() {
    let platform = FakePlatform::new(Reply::Inline).with_partition("1", b"payload");
    let scheduler = Arc::new(Parked::default());
    let client = client(
        &platform,
        ClientSettings::default().with_task_scheduler(scheduler.clone()),
    );
    let (make, rx) = collector();

    let token = client.get_data(partition("1", FetchOption::OnlineOnly), make());
    token.cancel();

    assert!(rx.recv().unwrap().unwrap_err().is_cancelled());

    scheduler.run_all();
    assert_eq!(platform.calls(), (0, 0, 0));
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_cancel_during_wait_unwinds() {
    let platform = FakePlatform::new(Reply::Threaded).with_partition("1", b"payload");
    platform.set_blob_reply(Reply::Never);
    let scheduler = Arc::new(ThreadPoolTaskScheduler::new(2).unwrap());
    let client = client(
        &platform,
        ClientSettings::default()
            .with_task_scheduler(scheduler)
            .with_request_timeout(Duration::from_secs(30)),
    );
    let (make, rx) = collector();

    let token = client.get_data(partition("1", FetchOption::OnlineOnly), make());
    while platform.blob_calls.load(Ordering::SeqCst) == 0 {
        std::thread::sleep(Duration::from_millis(1));
    }
    token.cancel();

    let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(result.unwrap_err().is_cancelled());
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    // The in-flight blob fetch was told to stop.
    assert!(platform.cancelled_calls.load(Ordering::SeqCst) >= 1);
}

#[test]
fn test_cancel_while_waiting_for_token() {
    common::init_logging();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let token_requests: Arc<Mutex<Vec<ResponseCallback<Option<String>>>>> = Arc::default();
    let provider_requests = Arc::clone(&token_requests);
    let apis = HttpApis::new(HttpNetwork::new(runtime.handle().clone()))
        .with_lookup_url("http://127.0.0.1:9/lookup/v1")
        .with_token_provider(Arc::new(move |callback: ResponseCallback<Option<String>>| {
            provider_requests.lock().unwrap().push(callback);
        }));
    let client = VersionedLayerClient::new(
        CATALOG,
        LAYER,
        Some(VERSION),
        ClientSettings::default()
            .with_task_scheduler(Arc::new(ThreadPoolTaskScheduler::new(1).unwrap()))
            .with_request_timeout(Duration::from_secs(30)),
        ApiClients::http(apis),
    );
    let (make, rx) = collector();

    let token = client.get_data(partition("1", FetchOption::OnlineOnly), make());
    while token_requests.lock().unwrap().is_empty() {
        std::thread::sleep(Duration::from_millis(1));
    }
    token.cancel();

    let result = rx.recv_timeout(Duration::from_millis(200)).unwrap();
    assert!(result.unwrap_err().is_cancelled());

    // The token showing up late sends nothing and answers nothing.
    let callbacks = std::mem::take(&mut *token_requests.lock().unwrap());
    for callback in callbacks {
        callback(Ok(Some("late".to_string())));
    }
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn test_drop_cancels_outstanding_requests() {
    let platform = FakePlatform::new(Reply::Threaded).with_partition("1", b"payload");
    platform.set_blob_reply(Reply::Never);
    let scheduler = Arc::new(ThreadPoolTaskScheduler::new(4).unwrap());
    let client = client(
        &platform,
        ClientSettings::default()
            .with_task_scheduler(scheduler)
            .with_request_timeout(Duration::from_secs(30)),
    );
    let (make, rx) = collector();

    for _ in 0..4 {
        client.get_data(partition("1", FetchOption::OnlineOnly), make());
    }
    while platform.blob_calls.load(Ordering::SeqCst) < 4 {
        std::thread::sleep(Duration::from_millis(1));
    }
    drop(client);

    for _ in 0..4 {
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(result.unwrap_err().is_cancelled());
    }
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn test_remove_from_cache() {
    let platform = FakePlatform::new(Reply::Inline).with_partition("1", b"payload");
    let cache = Arc::new(MemoryCache::new());
    let client = client(&platform, ClientSettings::default().with_cache(cache.clone()));

    client
        .get_data_future(partition("1", FetchOption::OnlineIfNotFound))
        .wait()
        .unwrap();
    client.remove_from_cache("1").unwrap();

    assert!(!cache.contains(&format!("{CATALOG}::{LAYER}::1::{VERSION}::partition")));
    assert!(!cache.contains(&format!("{CATALOG}::{LAYER}::handle-1::Data")));
    let error = client
        .get_data_future(partition("1", FetchOption::CacheOnly))
        .wait()
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn test_get_data_future_can_be_awaited() {
    let platform = FakePlatform::new(Reply::Threaded).with_partition("1", b"payload");
    let scheduler = Arc::new(ThreadPoolTaskScheduler::new(1).unwrap());
    let client = client(&platform, ClientSettings::default().with_task_scheduler(scheduler));

    let data = client
        .get_data_future(partition("1", FetchOption::OnlineIfNotFound))
        .await
        .unwrap();
    assert_eq!(data, b"payload");
}
