use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use webharvest::config::Config;
use webharvest::jobs::JobService;
use webharvest::queue::RedisPublisher;
use webharvest::storage::PgStorage;
use webharvest::{build_app, AppState};

/// REST façade: job submission, status, and results.
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
    let config = Arc::new(Config::load(&args.config).expect("Failed to load configuration"));

    let storage = PgStorage::connect(&config.storage)
        .await
        .expect("Failed to connect to storage");
    storage
        .ensure_schema()
        .await
        .expect("Failed to ensure storage schema");

    let url_queue = RedisPublisher::connect(&config.url_queue)
        .await
        .expect("Failed to connect url_queue publisher");

    let jobs = Arc::new(JobService::new(Arc::new(storage), Arc::new(url_queue)));

    let state = AppState {
        config: config.clone(),
        jobs,
    };

    let app = build_app(state);

    tracing::info!(addr = %config.http_addr, root = %config.http_root_path, "webserver starting");

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app).await.expect("Server error");
}
