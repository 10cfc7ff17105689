use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{routes, state::AppState};

/// Any origin when `TRENDLINE_CORS_ORIGINS` is empty, otherwise the listed
/// origins only. Unparseable entries are skipped with a warning.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return base.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// Middleware is applied in outer-to-inner order:
///
/// 1. `TraceLayer` — structured request/response logging via `tracing`.
/// 2. `CorsLayer` — the dashboard UI may be served from another origin.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/status", get(routes::status::status))
        .route("/api/reports", get(routes::reports::list_reports))
        .route(
            "/api/reports/generate",
            post(routes::reports::generate_report),
        )
        .route("/api/reports/delete", post(routes::reports::delete_reports))
        .route("/api/reports/pdf", post(routes::export::export_reports_pdf))
        .route(
            "/api/reports/{id}",
            get(routes::reports::get_report).delete(routes::reports::delete_report),
        )
        .route(
            "/api/reports/{id}/insights",
            post(routes::reports::regenerate_insights),
        )
        .route(
            "/api/reports/{id}/pdf",
            get(routes::export::export_report_pdf),
        )
        .route("/api/mock/comparison", get(routes::mock::mock_comparison))
        .route("/api/oauth/google/start", get(routes::oauth::start))
        .route("/api/oauth/google/callback", get(routes::oauth::callback))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
