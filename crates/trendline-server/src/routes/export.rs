use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::{error::AppError, pdf, routes::reports::IdsRequest, service, state::AppState};

fn build_pdf_response(filename: &str, bytes: Vec<u8>) -> Result<Response, AppError> {
    let disposition = format!("attachment; filename=\"{filename}\"");
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// Run a renderer off the async runtime.
async fn render<F>(job: F) -> Result<Vec<u8>, AppError>
where
    F: FnOnce() -> anyhow::Result<Vec<u8>> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("PDF render task failed: {e}")))?
        .map_err(AppError::Internal)
}

/// `GET /api/reports/{id}/pdf` - one report as an attachment.
#[tracing::instrument(skip(state))]
pub async fn export_report_pdf(
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<String>,
) -> Result<Response, AppError> {
    let (report, timeseries) = service::report_for_export(&state, &report_id).await?;
    let filename = pdf::attachment_name(&[report.id.as_str()]);
    let bytes = render(move || pdf::render_report(&report, &timeseries)).await?;
    build_pdf_response(&filename, bytes)
}

/// `POST /api/reports/pdf` - `{ "ids": [...] }`, one section per report.
#[tracing::instrument(skip(state, req))]
pub async fn export_reports_pdf(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IdsRequest>,
) -> Result<Response, AppError> {
    let reports = service::reports_for_export(&state, &req.ids).await?;
    let ids: Vec<&str> = reports.iter().map(|r| r.id.as_str()).collect();
    let filename = pdf::attachment_name(&ids);
    let bytes = render(move || pdf::render_reports(&reports)).await?;
    build_pdf_response(&filename, bytes)
}
