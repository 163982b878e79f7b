use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use webharvest::config::Config;
use webharvest::queue::{RedisPublisher, RedisReceiver};
use webharvest::scrape::HttpFetcher;
use webharvest::storage::PgStorage;
use webharvest::worker::Worker;

/// Consumes the work_queue: fetches, scrapes, and persists each URL, then
/// queues its descendants.
#[derive(Parser)]
struct Args {
    /// Path to the JSON config file.
    #[arg(long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config).expect("Failed to load configuration");

    let storage = PgStorage::connect(&config.storage)
        .await
        .expect("Failed to connect to storage");
    storage
        .ensure_schema()
        .await
        .expect("Failed to ensure storage schema");

    let mut receiver = RedisReceiver::connect(&config.work_queue)
        .await
        .expect("Failed to connect work_queue receiver");
    let url_queue = RedisPublisher::connect(&config.url_queue)
        .await
        .expect("Failed to connect url_queue publisher");

    let worker = Worker::new(
        Arc::new(storage),
        Arc::new(url_queue),
        HttpFetcher::new(config.max_body_bytes),
        config.max_level,
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            signal_token.cancel();
        }
    });

    tracing::info!(topic = %config.work_queue.topic, "worker started");
    worker.run(&mut receiver, config.work_delay, shutdown).await;
    tracing::info!("worker stopped");
}
