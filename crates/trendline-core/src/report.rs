//! Persisted reports and the storage interface.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::analysis::AiAnalysis;
use crate::analytics::{AnalyticsSnapshot, Period};
use crate::comparison::ComparisonResult;

/// Reports older than this many days are purged before listings are read.
pub const RETENTION_DAYS: i64 = 365;

/// A fully generated report, ready to be written in one go.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub title: String,
    pub property_id: String,
    /// Normalized deltas and ranges. `report_id` and `analysis` are ignored.
    pub result: ComparisonResult,
    pub current: AnalyticsSnapshot,
    pub comparison: AnalyticsSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    pub id: String,
    pub title: String,
    pub property_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub comparison_start: NaiveDate,
    pub comparison_end: NaiveDate,
    /// `{"current": <payload>, "comparison": <payload>}`.
    pub raw_data: serde_json::Value,
    /// `None` when nothing usable was stored.
    pub normalized_metrics: Option<ComparisonResult>,
    pub ai_analysis: Option<AiAnalysis>,
    pub created_at: String,
}

impl ReportRecord {
    /// The stored comparison, tagged with this record's id and analysis.
    pub fn to_comparison_result(&self) -> Option<ComparisonResult> {
        let mut result = self.normalized_metrics.clone()?;
        result.report_id = Some(self.id.clone());
        result.analysis = self.ai_analysis.clone();
        Some(result)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub id: String,
    pub title: String,
    pub property_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub comparison_start: NaiveDate,
    pub comparison_end: NaiveDate,
    pub metric_count: i64,
    pub has_analysis: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTimeseriesRow {
    pub period: Period,
    pub date: NaiveDate,
    pub metrics: BTreeMap<String, f64>,
}

/// Storage interface for reports and their child rows.
///
/// Deleting a report removes its raw payloads, totals, timeseries and
/// narrative history with it.
#[async_trait]
pub trait ReportStore: Send + Sync + 'static {
    async fn ping(&self) -> anyhow::Result<()>;

    async fn insert_report(&self, report: NewReport) -> anyhow::Result<ReportRecord>;

    async fn get_report(&self, id: &str) -> anyhow::Result<Option<ReportRecord>>;

    /// Records for every id that exists, newest first. Unknown ids are skipped.
    async fn get_reports(&self, ids: &[String]) -> anyhow::Result<Vec<ReportRecord>>;

    async fn list_reports(&self, limit: usize) -> anyhow::Result<Vec<ReportSummary>>;

    async fn get_timeseries(&self, id: &str) -> anyhow::Result<Vec<StoredTimeseriesRow>>;

    /// Overwrite the report's analysis and append it to the narrative
    /// history. Returns `false` when the report does not exist.
    async fn update_analysis(
        &self,
        id: &str,
        analysis: &AiAnalysis,
        model: &str,
    ) -> anyhow::Result<bool>;

    /// Returns the number of reports removed.
    async fn delete_reports(&self, ids: &[String]) -> anyhow::Result<usize>;

    /// Remove every report created more than `days` days ago.
    async fn purge_older_than(&self, days: i64) -> anyhow::Result<usize>;
}
