use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::AppError,
    service::{self, GenerateRequest},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct IdsRequest {
    #[serde(default)]
    pub ids: Vec<String>,
}

/// `POST /api/reports/generate` - fetch, compare, store and narrate.
///
/// Responds `201` with the `ComparisonResult`, including `reportId` and
/// `analysis` (the unavailable sentinel when no narrative could be made).
#[tracing::instrument(skip(state, req))]
pub async fn generate_report(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = service::generate_report(&state, req).await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": result }))))
}

/// `GET /api/reports?limit=` - newest first.
#[tracing::instrument(skip(state))]
pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = service::resolve_limit(query.limit);
    let reports = service::list_reports(&state, limit).await?;
    Ok(Json(json!({
        "data": reports,
        "limit": limit,
    })))
}

/// `GET /api/reports/{id}` - stored record, comparison and daily rows.
#[tracing::instrument(skip(state))]
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let detail = service::report_detail(&state, &report_id).await?;
    Ok(Json(json!({ "data": detail })))
}

/// `DELETE /api/reports/{id}`
#[tracing::instrument(skip(state))]
pub async fn delete_report(
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    service::delete_report(&state, &report_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/reports/delete` - `{ "ids": [...] }`.
#[tracing::instrument(skip(state, req))]
pub async fn delete_reports(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IdsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = service::delete_reports(&state, &req.ids).await?;
    Ok(Json(json!({ "data": { "deleted": deleted } })))
}

/// `POST /api/reports/{id}/insights` - regenerate the narrative.
#[tracing::instrument(skip(state))]
pub async fn regenerate_insights(
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let insights = service::regenerate_insights(&state, &report_id).await?;
    Ok(Json(json!({ "data": insights })))
}
