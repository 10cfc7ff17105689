use axum::{extract::Query, response::IntoResponse, Json};
use chrono::{Duration, NaiveDate};
use serde::Deserialize;
use serde_json::json;

use trendline_core::comparison::{calculate_comparison_range, ComparisonResult, DateRange};
use trendline_core::mock::build_mock_metrics;

use crate::error::AppError;

const DEFAULT_MOCK_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

fn parse_date(raw: Option<&str>, field: &str) -> Result<Option<NaiveDate>, AppError> {
    raw.map(str::trim)
        .filter(|r| !r.is_empty())
        .map(|r| {
            NaiveDate::parse_from_str(r, "%Y-%m-%d")
                .map_err(|_| AppError::BadRequest(format!("invalid {field} (expected YYYY-MM-DD)")))
        })
        .transpose()
}

/// Missing bounds default to the seven days ending `today`.
pub fn resolve_mock_range(
    start_raw: Option<&str>,
    end_raw: Option<&str>,
    today: NaiveDate,
) -> Result<DateRange, AppError> {
    let end = parse_date(end_raw, "endDate")?.unwrap_or(today);
    let start = match parse_date(start_raw, "startDate")? {
        Some(start) => start,
        None => end
            .checked_sub_signed(Duration::days(DEFAULT_MOCK_DAYS - 1))
            .ok_or_else(|| AppError::BadRequest(format!("endDate {end} is out of range")))?,
    };
    DateRange::new(start, end).map_err(|e| AppError::BadRequest(e.to_string()))
}

/// `GET /api/mock/comparison` - randomized comparison for demos. Nothing is
/// fetched or stored.
#[tracing::instrument]
pub async fn mock_comparison(Query(q): Query<MockQuery>) -> Result<impl IntoResponse, AppError> {
    let today = chrono::Utc::now().date_naive();
    let current_range = resolve_mock_range(q.start_date.as_deref(), q.end_date.as_deref(), today)?;
    let comparison_range = calculate_comparison_range(&current_range)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let result = ComparisonResult {
        metrics: build_mock_metrics(),
        comparison_range,
        current_range,
        report_id: None,
        analysis: None,
    };
    Ok(Json(json!({ "data": result })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("date")
    }

    #[test]
    fn defaults_to_last_week() {
        let range = resolve_mock_range(None, None, date("2024-03-07")).expect("range");
        assert_eq!(range.start(), date("2024-03-01"));
        assert_eq!(range.end(), date("2024-03-07"));
    }

    #[test]
    fn explicit_bounds_used() {
        let range = resolve_mock_range(Some("2024-01-01"), Some("2024-01-31"), date("2024-03-07"))
            .expect("range");
        assert_eq!(range.day_count(), 31);
    }

    #[test]
    fn bad_input_rejected() {
        assert!(resolve_mock_range(Some("soon"), None, date("2024-03-07")).is_err());
        assert!(resolve_mock_range(Some("2024-03-08"), None, date("2024-03-07")).is_err());
    }

    #[test]
    fn default_start_before_calendar_edge_rejected() {
        assert!(resolve_mock_range(None, Some("-262143-01-03"), date("2024-03-07")).is_err());
    }
}
