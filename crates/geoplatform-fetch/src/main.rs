//! Download one partition of a versioned geoplatform layer.
//!
//! Credentials come from a `credentials.properties` file or from the
//! `GEOPLATFORM_ACCESS_KEY_ID` and `GEOPLATFORM_ACCESS_KEY_SECRET`
//! environment variables. Without credentials requests are sent
//! unauthenticated.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use geoplatform_auth::{
    AuthenticationCredentials, CredentialsFile, DEFAULT_MINIMUM_VALIDITY, Settings, TokenEndpoint,
    TokenRequest, TokenResult,
};
use geoplatform_core::condition::ResponseCallback;
use geoplatform_core::{
    ApiResponse, ClientSettings, HttpNetwork, MemoryCache, ThreadPoolTaskScheduler, TokenProvider,
};
use geoplatform_read::api::DEFAULT_LOOKUP_URL;
use geoplatform_read::{ApiClients, DataRequest, FetchOption, HttpApis, VersionedLayerClient};

/// Token endpoint used when neither the arguments nor the credentials file
/// name one.
const DEFAULT_TOKEN_ENDPOINT: &str = "https://account.api.here.com/oauth2/token";

#[derive(Parser, Debug)]
#[command(about = "Download a partition from a versioned geoplatform layer")]
struct CliArgs {
    /// Catalog resource name, e.g. `hrn:here:data::olp-here:rib-2`.
    #[arg(long)]
    catalog: String,

    /// Layer id within the catalog.
    #[arg(long)]
    layer: String,

    /// Layer version; the catalog's latest version when omitted.
    #[arg(long)]
    layer_version: Option<i64>,

    /// Partition id to download.
    #[arg(long, required_unless_present = "data_handle", conflicts_with = "data_handle")]
    partition: Option<String>,

    /// Data handle to download directly.
    #[arg(long)]
    data_handle: Option<String>,

    /// How the cache takes part in the request.
    #[arg(long, default_value_t = FetchOption::OnlineIfNotFound)]
    fetch_option: FetchOption,

    /// Path to a `credentials.properties` file.
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Access key id, if no credentials file is given.
    #[arg(long, env = "GEOPLATFORM_ACCESS_KEY_ID")]
    access_key_id: Option<String>,

    /// Access key secret, if no credentials file is given.
    #[arg(long, env = "GEOPLATFORM_ACCESS_KEY_SECRET", hide_env_values = true)]
    access_key_secret: Option<String>,

    /// OAuth2 token endpoint URL.
    #[arg(long)]
    token_endpoint: Option<String>,

    /// API lookup service URL.
    #[arg(long, default_value = DEFAULT_LOOKUP_URL)]
    lookup_url: String,

    /// Number of worker threads running requests.
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Timeout of each remote call, in seconds.
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Output file; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    let args = CliArgs::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    let timeout = Duration::from_secs(args.timeout_secs);

    // Drives the HTTP transport; requests themselves run on the worker pool.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("geoplatform-http")
        .enable_all()
        .build()?;
    let network = HttpNetwork::new(runtime.handle().clone()).with_timeout(timeout);

    let mut apis = HttpApis::new(network.clone()).with_lookup_url(&args.lookup_url);
    if let Some(token_provider) = token_provider(args, &network, timeout)? {
        apis = apis.with_token_provider(token_provider);
    }

    let scheduler = ThreadPoolTaskScheduler::new(args.workers)?;
    tracing::debug!(workers = scheduler.threads(), "started worker pool");

    let settings = ClientSettings::default()
        .with_task_scheduler(Arc::new(scheduler))
        .with_cache(Arc::new(MemoryCache::new()))
        .with_request_timeout(timeout);
    let client = VersionedLayerClient::new(
        &args.catalog,
        &args.layer,
        args.layer_version,
        settings,
        ApiClients::http(apis),
    );

    let mut request = DataRequest::new().with_fetch_option(args.fetch_option);
    if let Some(partition) = &args.partition {
        request = request.with_partition_id(partition);
    }
    if let Some(data_handle) = &args.data_handle {
        request = request.with_data_handle(data_handle);
    }

    tracing::info!(
        catalog = %args.catalog,
        layer = %args.layer,
        fetch_option = %args.fetch_option,
        "fetching data"
    );
    let data = client.get_data_future(request).wait()?;
    tracing::info!(bytes = data.len(), "fetched data");

    match &args.output {
        Some(path) => std::fs::write(path, &data)?,
        None => std::io::stdout().lock().write_all(&data)?,
    }
    Ok(())
}

/// Build a provider of bearer tokens from the configured credentials.
fn token_provider(
    args: &CliArgs,
    network: &HttpNetwork,
    timeout: Duration,
) -> Result<Option<TokenProvider>, Box<dyn std::error::Error>> {
    let (credentials, file_endpoint) = if let Some(path) = &args.credentials {
        let file = CredentialsFile::read(path)?;
        (file.credentials, file.token_endpoint_url)
    } else if let (Some(key), Some(secret)) = (&args.access_key_id, &args.access_key_secret) {
        (AuthenticationCredentials::new(key, secret), None)
    } else {
        tracing::warn!("no credentials configured, sending requests unauthenticated");
        return Ok(None);
    };

    let token_endpoint = args
        .token_endpoint
        .clone()
        .or(file_endpoint)
        .unwrap_or_else(|| DEFAULT_TOKEN_ENDPOINT.to_string());
    tracing::debug!(%token_endpoint, key = %credentials.key, "using credentials");

    let mut settings = Settings::new(token_endpoint, credentials);
    settings.request_timeout = timeout;
    let token = TokenEndpoint::new(settings, network.clone())
        .request_auto_refreshing_token(TokenRequest::default());

    Ok(Some(Arc::new(move |callback: ResponseCallback<Option<String>>| {
        token.get_token(
            DEFAULT_MINIMUM_VALIDITY,
            Box::new(move |result: ApiResponse<TokenResult>| {
                if let Err(e) = &result {
                    tracing::warn!(error = %e, "failed to get an access token");
                }
                callback(result.map(|token| Some(token.access_token)));
            }),
        );
    })))
}
