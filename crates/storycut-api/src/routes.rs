//! API routes.

use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::health::{health, ready};
use crate::handlers::jobs::{cancel_job, get_job};
use crate::handlers::media::{
    delete_media, enrich_media, get_candidates, get_media, get_scenes, get_transcript,
    register_media,
};
use crate::handlers::plans::{get_plan, plan_heuristic, plan_story};
use crate::handlers::renders::{get_render, render_plan};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let media_routes = Router::new()
        .route("/media", post(register_media))
        .route("/media/:media_id", get(get_media))
        .route("/media/:media_id", delete(delete_media))
        .route("/media/:media_id/enrich", post(enrich_media))
        .route("/media/:media_id/transcript", get(get_transcript))
        .route("/media/:media_id/scenes", get(get_scenes))
        .route("/media/:media_id/candidates", get(get_candidates))
        .route("/media/:media_id/plans/heuristic", post(plan_heuristic))
        .route("/media/:media_id/plans/story", post(plan_story));

    let plan_routes = Router::new()
        .route("/plans/:plan_id", get(get_plan))
        .route("/plans/:plan_id/render", post(render_plan));

    let render_routes = Router::new().route("/renders/:render_id", get(get_render));

    let job_routes = Router::new()
        .route("/jobs/:job_id", get(get_job))
        .route("/jobs/:job_id/cancel", post(cancel_job));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(media_routes)
        .merge(plan_routes)
        .merge(render_routes)
        .merge(job_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| o.parse::<HeaderValue>().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(parsed)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
