use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// `GET /api/status` - which integrations are ready.
///
/// `missing` lists unset settings. A missing `OPENAI_API_KEY` only disables
/// narratives, so `analyticsReady` ignores it.
#[tracing::instrument(skip(state))]
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let missing = state.config.missing_settings();
    let analytics_ready = state.analytics.missing_settings().is_empty()
        && state.config.google.property_id.is_some();

    Json(json!({
        "data": {
            "analyticsReady": analytics_ready,
            "narrativesEnabled": state.narrator.is_some(),
            "missing": missing,
        }
    }))
}
