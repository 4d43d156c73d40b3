mod check_stream;
mod pacing;
mod problem;
mod router;
mod telemetry;

use std::{net::SocketAddr, sync::Arc};

use tracing::info;

use hns_scout_core::PartitionCalendar;
use hns_scout_lookup::MarketplaceClient;
use hns_scout_storage::{FileBackend, PartitionBackend, PartitionStore, SqliteBackend, StoreError};
use hns_scout_util::{load_env_file, AppConfig, StoreLocation};

use crate::check_stream::StreamController;
use crate::pacing::PacingPolicy;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let store = open_store(&config.store).await?;
    let http = reqwest::Client::builder()
        .timeout(config.lookup_timeout)
        .build()?;
    let lookup = MarketplaceClient::new(config.lookup_url.clone(), http);
    let streams = StreamController::new(
        lookup,
        store.clone(),
        PacingPolicy::new(config.check_interval),
        PartitionCalendar::from_zone(config.partition_tz),
    );

    let state = router::AppState::new(metrics, store, streams, config.static_dir.clone());

    let addr: SocketAddr = config.bind_addr;
    info!(
        stage = "app",
        %addr,
        env = %config.environment.as_str(),
        lookup = %config.lookup_url,
        interval_ms = config.check_interval.as_millis() as u64,
        "starting HTTP server"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}

async fn open_store(location: &StoreLocation) -> Result<PartitionStore, StoreError> {
    let backend: Arc<dyn PartitionBackend> = match location {
        StoreLocation::Directory(dir) => {
            let backend = FileBackend::open(dir).await?;
            info!(stage = "storage", dir = %backend.root().display(), "using partition directory");
            Arc::new(backend)
        }
        StoreLocation::Sqlite(url) => Arc::new(SqliteBackend::connect(url).await?),
    };
    info!(stage = "storage", backend = backend.name(), "partition store ready");
    Ok(PartitionStore::new(backend))
}
