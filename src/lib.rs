pub mod config;
pub mod foreman;
pub mod jobs;
pub mod mime;
pub mod models;
pub mod queue;
pub mod scrape;
pub mod server;
pub mod storage;
pub mod worker;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::jobs::JobService;

/// Shared application state passed to all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jobs: Arc<JobService>,
}

pub fn build_app(state: AppState) -> Router {
    // CORS layer — permissive for the internal service
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let routes = Router::new()
        .route("/", post(server::routes::schedule_job))
        .route("/status/{job_id}", get(server::routes::job_status))
        .route("/result/{job_id}", get(server::routes::job_result))
        .route("/health", get(server::routes::health));

    let root_path = state.config.http_root_path.clone();
    let app = if root_path == "/" {
        routes
    } else {
        Router::new().nest(&root_path, routes)
    };

    app.layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
