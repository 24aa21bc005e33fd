use axum::{routing::get, routing::post, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::abort::{AbortHandle, AbortSignal};
use crate::predict::SnapshotStore;
use crate::tracker::StatusHandle;

use super::api::passes as pass_handlers;
use super::api::tracker as tracker_handlers;
use super::api_doc::ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub station: Option<String>,
    pub status: StatusHandle,
    pub snapshots: Arc<SnapshotStore>,
    pub abort: AbortHandle,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Tracker API endpoints
        .route("/api/tracker/status", get(tracker_handlers::status))
        .route("/api/tracker/sample", get(tracker_handlers::sample))
        .route("/api/tracker/stop", post(tracker_handlers::stop))
        // Predict API endpoints
        .route("/api/passes", get(pass_handlers::list_passes))
        // OpenAPI
        .route(
            "/api-doc/openapi.json",
            get(|| async { axum::Json(ApiDoc::openapi()) }),
        )
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the status API until `shutdown` fires.
pub async fn run_server(
    bind_addr: &str,
    state: AppState,
    mut shutdown: AbortSignal,
) -> std::io::Result<()> {
    let app = router(state);

    log::info!("Starting status API on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.aborted().await })
        .await
}
