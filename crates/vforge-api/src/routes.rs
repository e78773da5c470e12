//! API route definitions.

use axum::middleware;
use axum::routing::{get, patch, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;

use crate::handlers;
use crate::middleware as mw;
use crate::state::AppState;

/// Create the application router with all routes and middleware.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let v1_routes = Router::new()
        .route("/generate", post(handlers::generate))
        .route("/plan", post(handlers::plan))
        .route("/jobs", get(handlers::list_jobs))
        .route("/jobs/:job_id", get(handlers::get_job))
        .route("/jobs/:job_id/render", post(handlers::render))
        .route("/jobs/:job_id/shots/:shot_id", patch(handlers::update_shot))
        .route(
            "/jobs/:job_id/shots/:shot_id/regenerate",
            post(handlers::regenerate_shot),
        )
        .route("/jobs/:job_id/finalize", post(handlers::finalize_job))
        .route("/jobs/:job_id/revise", post(handlers::revise_job));

    let layout = state.orchestrator.assets().layout();
    let static_prefix = layout.url_prefix().to_string();
    let static_dir = ServeDir::new(layout.root());

    let mut app = Router::new()
        .nest("/v1", v1_routes)
        .route("/healthz", get(handlers::healthz));

    // A CDN prefix is an absolute URL; only local prefixes are served here.
    if static_prefix.starts_with('/') {
        app = app.nest_service(&static_prefix, static_dir);
    }

    if let Some(handle) = metrics_handle {
        app = app.route("/metrics", get(move || async move { handle.render() }));
    }

    app.layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(crate::metrics::metrics_middleware))
        .layer(middleware::from_fn(mw::security_headers))
        .layer(middleware::from_fn(mw::request_id))
        .layer(middleware::from_fn(mw::request_logging))
        .layer(mw::cors_layer(&state.config.cors_origins))
        .with_state(state)
}
