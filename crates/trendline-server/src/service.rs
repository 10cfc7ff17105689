//! Report orchestration: generation, insight regeneration, listing and
//! deletion, independent of the HTTP layer.
//!
//! Generation is all-or-nothing up to and including the store write. The
//! narrative step runs afterwards in its own failure boundary: whatever
//! happens there, the caller still gets the stored report back.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use trendline_core::analysis::{narrate, AiAnalysis, Narrative, NarrativeInput};
use trendline_core::analytics::resolve_metric_names;
use trendline_core::comparison::{
    calculate_comparison_range, compute_changes, ComparisonResult, DateRange,
};
use trendline_core::report::{
    NewReport, ReportRecord, ReportSummary, StoredTimeseriesRow, RETENTION_DAYS,
};

use crate::state::AppState;

pub const DEFAULT_LIST_LIMIT: usize = 20;
pub const MAX_LIST_LIMIT: usize = 100;

const TITLE_MIN_CHARS: usize = 3;
const TITLE_MAX_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{0}")]
    Validation(String),

    #[error("missing configuration: {}", .0.join(", "))]
    Configuration(Vec<String>),

    #[error("{0}")]
    NotFound(String),

    /// The analytics source or the store failed. Nothing was persisted by
    /// this operation beyond what the store committed itself.
    #[error("{0:#}")]
    Upstream(anyhow::Error),
}

/// Body of `POST /api/reports/generate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub title: Option<String>,
    pub property_id: Option<String>,
    #[serde(default)]
    pub metrics: Vec<String>,
    /// Explicit comparison period. Both bounds or neither.
    pub comparison_start_date: Option<String>,
    pub comparison_end_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct GeneratePlan {
    title: String,
    current: DateRange,
    comparison: DateRange,
    metrics: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegeneratedInsights {
    pub report_id: String,
    pub analysis: AiAnalysis,
    /// `false` when the narrative was unavailable and the earlier analysis,
    /// if any, was left in place.
    pub stored: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDetail {
    pub report: ReportRecord,
    pub comparison: Option<ComparisonResult>,
    pub timeseries: Vec<StoredTimeseriesRow>,
}

fn parse_request_date(raw: Option<&str>, field: &str) -> Result<NaiveDate, ReportError> {
    let raw = raw
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ReportError::Validation("Provide start and end dates.".to_string()))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ReportError::Validation(format!("invalid {field} (expected YYYY-MM-DD)")))
}

fn parse_optional_date(raw: Option<&str>, field: &str) -> Result<Option<NaiveDate>, ReportError> {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ReportError::Validation(format!("invalid {field} (expected YYYY-MM-DD)"))),
    }
}

fn range(start: NaiveDate, end: NaiveDate, what: &str) -> Result<DateRange, ReportError> {
    DateRange::new(start, end)
        .map_err(|_| ReportError::Validation(format!("{what} end date must be on or after its start date")))
}

fn validate(request: &GenerateRequest) -> Result<GeneratePlan, ReportError> {
    let start = parse_request_date(request.start_date.as_deref(), "startDate")?;
    let end = parse_request_date(request.end_date.as_deref(), "endDate")?;
    let current = range(start, end, "Report")?;

    let comparison = match (
        parse_optional_date(request.comparison_start_date.as_deref(), "comparisonStartDate")?,
        parse_optional_date(request.comparison_end_date.as_deref(), "comparisonEndDate")?,
    ) {
        (None, None) => calculate_comparison_range(&current)
            .map_err(|e| ReportError::Validation(e.to_string()))?,
        (Some(start), Some(end)) => range(start, end, "Comparison")?,
        _ => {
            return Err(ReportError::Validation(
                "Provide both comparison dates or neither.".to_string(),
            ))
        }
    };

    let title = match request.title.as_deref().map(str::trim) {
        None | Some("") => format!("Report {start} to {end}"),
        Some(title) => {
            let chars = title.chars().count();
            if !(TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&chars) {
                return Err(ReportError::Validation(format!(
                    "title must be between {TITLE_MIN_CHARS} and {TITLE_MAX_CHARS} characters"
                )));
            }
            title.to_string()
        }
    };

    Ok(GeneratePlan {
        title,
        current,
        comparison,
        metrics: resolve_metric_names(&request.metrics),
    })
}

/// Store a generated narrative on the report. Returns whether anything was
/// written. Never fails the caller.
async fn store_narrative(state: &AppState, report_id: &str, narrative: &Narrative) -> bool {
    match narrative {
        Narrative::Unavailable { reason } => {
            warn!(report_id, reason = %reason, "Narrative unavailable");
            false
        }
        Narrative::Generated { analysis, model } => {
            match state.store.update_analysis(report_id, analysis, model).await {
                Ok(stored) => stored,
                Err(e) => {
                    warn!(report_id, error = %e, "Failed to store narrative");
                    false
                }
            }
        }
    }
}

/// Fetch both periods, compute the deltas, persist the report and attach a
/// narrative.
pub async fn generate_report(
    state: &AppState,
    request: GenerateRequest,
) -> Result<ComparisonResult, ReportError> {
    let plan = validate(&request)?;

    let property_id = request
        .property_id
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .or_else(|| state.config.google.property_id.clone());

    let mut missing: Vec<String> = Vec::new();
    if property_id.is_none() {
        missing.push("GA4_PROPERTY_ID".to_string());
    }
    missing.extend(state.analytics.missing_settings().into_iter().map(str::to_string));
    let Some(property_id) = property_id.filter(|_| missing.is_empty()) else {
        return Err(ReportError::Configuration(missing));
    };

    let (current, comparison) = tokio::try_join!(
        state.analytics.fetch(&property_id, &plan.current, &plan.metrics),
        state.analytics.fetch(&property_id, &plan.comparison, &plan.metrics),
    )
    .map_err(ReportError::Upstream)?;

    let mut result = ComparisonResult {
        metrics: compute_changes(&current.totals, &comparison.totals),
        current_range: plan.current,
        comparison_range: plan.comparison,
        report_id: None,
        analysis: None,
    };

    let record = state
        .store
        .insert_report(NewReport {
            title: plan.title,
            property_id,
            result: result.clone(),
            current,
            comparison,
        })
        .await
        .map_err(|e| ReportError::Upstream(e.context("failed to store report")))?;
    state.invalidate_listing().await;
    info!(report_id = %record.id, metrics = result.metrics.len(), "Report generated");

    let narrative = narrate(
        state.narrator(),
        &NarrativeInput {
            title: &record.title,
            current_range: result.current_range,
            comparison_range: result.comparison_range,
            metrics: &result.metrics,
        },
    )
    .await;
    if store_narrative(state, &record.id, &narrative).await {
        state.invalidate_listing().await;
    }

    result.report_id = Some(record.id);
    result.analysis = Some(narrative.into_analysis());
    Ok(result)
}

async fn load_report(state: &AppState, report_id: &str) -> Result<ReportRecord, ReportError> {
    state
        .store
        .get_report(report_id)
        .await
        .map_err(ReportError::Upstream)?
        .ok_or_else(|| ReportError::NotFound("Report not found".to_string()))
}

/// Narrate a stored report again and overwrite its analysis.
pub async fn regenerate_insights(
    state: &AppState,
    report_id: &str,
) -> Result<RegeneratedInsights, ReportError> {
    let record = load_report(state, report_id).await?;
    let Some(stored) = record.normalized_metrics.as_ref() else {
        return Err(ReportError::Validation(
            "No normalized metrics stored for this report.".to_string(),
        ));
    };

    let narrative = narrate(
        state.narrator(),
        &NarrativeInput {
            title: &record.title,
            current_range: stored.current_range,
            comparison_range: stored.comparison_range,
            metrics: &stored.metrics,
        },
    )
    .await;

    let written = store_narrative(state, &record.id, &narrative).await;
    if written {
        state.invalidate_listing().await;
        info!(report_id = %record.id, "Insights regenerated");
    }

    Ok(RegeneratedInsights {
        report_id: record.id,
        analysis: narrative.into_analysis(),
        stored: written,
    })
}

pub async fn report_detail(state: &AppState, report_id: &str) -> Result<ReportDetail, ReportError> {
    let report = load_report(state, report_id).await?;
    let timeseries = state
        .store
        .get_timeseries(&report.id)
        .await
        .map_err(ReportError::Upstream)?;
    Ok(ReportDetail {
        comparison: report.to_comparison_result(),
        report,
        timeseries,
    })
}

/// Clamp a caller-supplied page size to `1..=MAX_LIST_LIMIT`.
pub fn resolve_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

/// Newest reports first. Expired reports are swept before reading; a failed
/// sweep is logged and the listing is served anyway.
pub async fn list_reports(state: &AppState, limit: usize) -> Result<Vec<ReportSummary>, ReportError> {
    match state.store.purge_older_than(RETENTION_DAYS).await {
        Ok(0) => {}
        Ok(_) => state.invalidate_listing().await,
        Err(e) => warn!(error = %e, "Retention sweep failed"),
    }

    if let Some(cached) = state.cached_listing(limit).await {
        return Ok(cached);
    }

    let reports = state
        .store
        .list_reports(limit)
        .await
        .map_err(ReportError::Upstream)?;
    state.put_listing(limit, reports.clone()).await;
    Ok(reports)
}

pub async fn delete_report(state: &AppState, report_id: &str) -> Result<(), ReportError> {
    let removed = state
        .store
        .delete_reports(&[report_id.to_string()])
        .await
        .map_err(ReportError::Upstream)?;
    if removed == 0 {
        return Err(ReportError::NotFound("Report not found".to_string()));
    }
    state.invalidate_listing().await;
    info!(report_id, "Report deleted");
    Ok(())
}

fn clean_ids(ids: &[String]) -> Vec<String> {
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Returns the number of reports removed. Unknown ids are ignored.
pub async fn delete_reports(state: &AppState, ids: &[String]) -> Result<usize, ReportError> {
    let ids = clean_ids(ids);
    if ids.is_empty() {
        return Err(ReportError::Validation("No reports selected.".to_string()));
    }
    let removed = state
        .store
        .delete_reports(&ids)
        .await
        .map_err(ReportError::Upstream)?;
    if removed > 0 {
        state.invalidate_listing().await;
    }
    info!(requested = ids.len(), removed, "Reports deleted");
    Ok(removed)
}

/// Reports for a bulk export, newest first, keeping only those with stored
/// metrics.
pub async fn reports_for_export(
    state: &AppState,
    ids: &[String],
) -> Result<Vec<ReportRecord>, ReportError> {
    let ids = clean_ids(ids);
    if ids.is_empty() {
        return Err(ReportError::Validation("Select at least one report.".to_string()));
    }
    let reports: Vec<ReportRecord> = state
        .store
        .get_reports(&ids)
        .await
        .map_err(ReportError::Upstream)?
        .into_iter()
        .filter(|r| r.normalized_metrics.as_ref().is_some_and(|n| !n.metrics.is_empty()))
        .collect();
    if reports.is_empty() {
        return Err(ReportError::Validation(
            "No stored metrics found for selected reports.".to_string(),
        ));
    }
    Ok(reports)
}

/// A single report and its daily rows, for the one-report export.
pub async fn report_for_export(
    state: &AppState,
    report_id: &str,
) -> Result<(ReportRecord, Vec<StoredTimeseriesRow>), ReportError> {
    let detail = report_detail(state, report_id).await?;
    Ok((detail.report, detail.timeseries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(start: &str, end: &str) -> GenerateRequest {
        GenerateRequest {
            start_date: Some(start.to_string()),
            end_date: Some(end.to_string()),
            ..GenerateRequest::default()
        }
    }

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("date")
    }

    #[test]
    fn missing_dates_rejected() {
        let err = validate(&GenerateRequest::default()).expect_err("missing dates");
        assert_eq!(err.to_string(), "Provide start and end dates.");

        let err = validate(&request("2024-03-01", "  ")).expect_err("blank end");
        assert_eq!(err.to_string(), "Provide start and end dates.");
    }

    #[test]
    fn malformed_and_inverted_dates_rejected() {
        assert!(matches!(
            validate(&request("03/01/2024", "2024-03-07")),
            Err(ReportError::Validation(_))
        ));
        assert!(matches!(
            validate(&request("2024-03-07", "2024-03-01")),
            Err(ReportError::Validation(_))
        ));
    }

    #[test]
    fn defaults_title_metrics_and_comparison() {
        let plan = validate(&request("2024-03-01", "2024-03-07")).expect("plan");
        assert_eq!(plan.title, "Report 2024-03-01 to 2024-03-07");
        assert_eq!(plan.metrics, vec!["sessions", "totalUsers", "eventCount", "conversions"]);
        assert_eq!(plan.comparison.start(), date("2024-02-23"));
        assert_eq!(plan.comparison.end(), date("2024-02-29"));
    }

    #[test]
    fn title_length_bounds() {
        let mut req = request("2024-03-01", "2024-03-07");
        req.title = Some("ab".to_string());
        assert!(validate(&req).is_err());
        req.title = Some("x".repeat(201));
        assert!(validate(&req).is_err());
        req.title = Some("  Q1 traffic  ".to_string());
        assert_eq!(validate(&req).expect("plan").title, "Q1 traffic");
    }

    #[test]
    fn explicit_comparison_must_be_complete_and_ordered() {
        let mut req = request("2024-03-01", "2024-03-07");
        req.comparison_start_date = Some("2023-03-01".to_string());
        assert!(validate(&req).is_err());

        req.comparison_end_date = Some("2023-02-01".to_string());
        assert!(validate(&req).is_err());

        req.comparison_end_date = Some("2023-03-07".to_string());
        let plan = validate(&req).expect("plan");
        assert_eq!(plan.comparison.start(), date("2023-03-01"));
        assert_eq!(plan.comparison.end(), date("2023-03-07"));
    }

    #[test]
    fn dates_at_calendar_edge_rejected() {
        let err = validate(&request("-262143-01-01", "-262143-01-01")).expect_err("edge");
        assert!(matches!(err, ReportError::Validation(_)));
        assert!(err.to_string().contains("outside the supported calendar"));

        assert!(matches!(
            validate(&request("-200000-01-01", "2024-01-01")),
            Err(ReportError::Validation(_))
        ));
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(resolve_limit(None), DEFAULT_LIST_LIMIT);
        assert_eq!(resolve_limit(Some(0)), 1);
        assert_eq!(resolve_limit(Some(500)), MAX_LIST_LIMIT);
        assert_eq!(resolve_limit(Some(7)), 7);
    }

    #[test]
    fn configuration_error_lists_settings() {
        let err = ReportError::Configuration(vec!["A".into(), "B".into()]);
        assert_eq!(err.to_string(), "missing configuration: A, B");
    }
}
