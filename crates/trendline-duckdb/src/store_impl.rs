use async_trait::async_trait;

use trendline_core::analysis::AiAnalysis;
use trendline_core::report::{
    NewReport, ReportRecord, ReportStore, ReportSummary, StoredTimeseriesRow,
};

use crate::reports;
use crate::DuckDbBackend;

#[async_trait]
impl ReportStore for DuckDbBackend {
    async fn ping(&self) -> anyhow::Result<()> {
        DuckDbBackend::ping(self).await
    }

    async fn insert_report(&self, report: NewReport) -> anyhow::Result<ReportRecord> {
        reports::insert_report_inner(self, report).await
    }

    async fn get_report(&self, id: &str) -> anyhow::Result<Option<ReportRecord>> {
        reports::get_report_inner(self, id).await
    }

    async fn get_reports(&self, ids: &[String]) -> anyhow::Result<Vec<ReportRecord>> {
        reports::get_reports_inner(self, ids).await
    }

    async fn list_reports(&self, limit: usize) -> anyhow::Result<Vec<ReportSummary>> {
        reports::list_reports_inner(self, limit).await
    }

    async fn get_timeseries(&self, id: &str) -> anyhow::Result<Vec<StoredTimeseriesRow>> {
        reports::get_timeseries_inner(self, id).await
    }

    async fn update_analysis(
        &self,
        id: &str,
        analysis: &AiAnalysis,
        model: &str,
    ) -> anyhow::Result<bool> {
        reports::update_analysis_inner(self, id, analysis, model).await
    }

    async fn delete_reports(&self, ids: &[String]) -> anyhow::Result<usize> {
        reports::delete_reports_inner(self, ids).await
    }

    async fn purge_older_than(&self, days: i64) -> anyhow::Result<usize> {
        reports::purge_older_than_inner(self, days).await
    }
}
