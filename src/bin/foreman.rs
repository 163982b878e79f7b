use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use webharvest::config::Config;
use webharvest::foreman::Foreman;
use webharvest::queue::{RedisPublisher, RedisReceiver};
use webharvest::storage::PgStorage;

/// Consumes the url_queue and routes tasks to the work_queue or
/// short-circuits them from the cached link graph.
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

    let mut receiver = RedisReceiver::connect(&config.url_queue)
        .await
        .expect("Failed to connect url_queue receiver");
    let url_queue = RedisPublisher::connect(&config.url_queue)
        .await
        .expect("Failed to connect url_queue publisher");
    let work_queue = RedisPublisher::connect(&config.work_queue)
        .await
        .expect("Failed to connect work_queue publisher");

    let foreman = Foreman::new(
        Arc::new(storage),
        Arc::new(url_queue),
        Arc::new(work_queue),
        config.cache_max_age,
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

    tracing::info!(topic = %config.url_queue.topic, "foreman started");
    foreman.run(&mut receiver, shutdown).await;
    tracing::info!("foreman stopped");
}
