use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use chrono::{Duration, NaiveDate};
use duckdb::Connection;
use serde_json::{Map, Value};
use tracing::{info, warn};

use trendline_core::analysis::AiAnalysis;
use trendline_core::analytics::{AnalyticsSnapshot, Period};
use trendline_core::comparison::ComparisonResult;
use trendline_core::report::{NewReport, ReportRecord, ReportSummary, StoredTimeseriesRow};

use crate::backend::{format_timestamp, generate_id, timestamp_now};
use crate::DuckDbBackend;

/// Raw `reports` row with dates still in their VARCHAR form.
struct ReportRow {
    id: String,
    title: String,
    property_id: String,
    start_date: String,
    end_date: String,
    comparison_start: String,
    comparison_end: String,
    normalized_metrics: String,
    ai_analysis: Option<String>,
    created_at: String,
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| anyhow!("invalid stored date {raw:?}: {e}"))
}

fn parse_normalized(report_id: &str, raw: &str) -> Option<ComparisonResult> {
    match serde_json::from_str(raw) {
        Ok(result) => Some(result),
        Err(e) => {
            warn!(report_id, error = %e, "Stored normalized_metrics is not a comparison result");
            None
        }
    }
}

fn parse_analysis(report_id: &str, raw: Option<&str>) -> Option<AiAnalysis> {
    let raw = raw?;
    match serde_json::from_str(raw) {
        Ok(analysis) => Some(analysis),
        Err(e) => {
            warn!(report_id, error = %e, "Stored ai_analysis could not be parsed");
            None
        }
    }
}

fn map_report_row(row: &duckdb::Row<'_>) -> Result<ReportRow, duckdb::Error> {
    Ok(ReportRow {
        id: row.get(0)?,
        title: row.get(1)?,
        property_id: row.get(2)?,
        start_date: row.get(3)?,
        end_date: row.get(4)?,
        comparison_start: row.get(5)?,
        comparison_end: row.get(6)?,
        normalized_metrics: row.get(7)?,
        ai_analysis: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn load_raw_data(conn: &Connection, report_id: &str) -> Result<Value> {
    let mut stmt =
        conn.prepare("SELECT period, payload FROM report_raw_payloads WHERE report_id = ?1")?;
    let rows = stmt.query_map(duckdb::params![report_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut raw = Map::new();
    for row in rows {
        let (period, payload) = row?;
        let value = serde_json::from_str(&payload).unwrap_or(Value::String(payload));
        raw.insert(period, value);
    }
    Ok(Value::Object(raw))
}

fn get_report_by_id(conn: &Connection, report_id: &str) -> Result<Option<ReportRecord>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT
            id,
            title,
            property_id,
            CAST(start_date AS VARCHAR),
            CAST(end_date AS VARCHAR),
            CAST(comparison_start AS VARCHAR),
            CAST(comparison_end AS VARCHAR),
            normalized_metrics,
            ai_analysis,
            CAST(created_at AS VARCHAR)
        FROM reports
        WHERE id = ?1
        "#,
    )?;
    let row = match stmt.query_row(duckdb::params![report_id], map_report_row) {
        Ok(row) => row,
        Err(duckdb::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let raw_data = load_raw_data(conn, &row.id)?;
    Ok(Some(ReportRecord {
        start_date: parse_date(&row.start_date)?,
        end_date: parse_date(&row.end_date)?,
        comparison_start: parse_date(&row.comparison_start)?,
        comparison_end: parse_date(&row.comparison_end)?,
        raw_data,
        normalized_metrics: parse_normalized(&row.id, &row.normalized_metrics),
        ai_analysis: parse_analysis(&row.id, row.ai_analysis.as_deref()),
        id: row.id,
        title: row.title,
        property_id: row.property_id,
        created_at: row.created_at,
    }))
}

fn insert_snapshot(
    conn: &Connection,
    report_id: &str,
    period: Period,
    snapshot: &AnalyticsSnapshot,
) -> Result<()> {
    conn.execute(
        "INSERT INTO report_raw_payloads (report_id, period, payload) VALUES (?1, ?2, ?3)",
        duckdb::params![report_id, period.as_str(), snapshot.raw.to_string()],
    )?;

    for (position, total) in snapshot.totals.iter().enumerate() {
        conn.execute(
            r#"INSERT INTO report_totals (report_id, period, position, metric, value)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            duckdb::params![
                report_id,
                period.as_str(),
                position as i64,
                total.metric,
                total.value
            ],
        )?;
    }

    for row in &snapshot.timeseries {
        conn.execute(
            r#"INSERT INTO report_timeseries (report_id, period, day, metrics)
               VALUES (?1, ?2, CAST(?3 AS DATE), ?4)"#,
            duckdb::params![
                report_id,
                period.as_str(),
                row.date.to_string(),
                serde_json::to_string(&row.metrics)?
            ],
        )?;
    }
    Ok(())
}

/// Delete reports and every child row. Callers run this inside a
/// transaction so a report never loses its children without being removed.
fn delete_ids(conn: &Connection, ids: &[String]) -> Result<usize> {
    let mut removed = 0;
    for id in ids {
        conn.execute(
            "DELETE FROM report_raw_payloads WHERE report_id = ?1",
            duckdb::params![id],
        )?;
        conn.execute(
            "DELETE FROM report_totals WHERE report_id = ?1",
            duckdb::params![id],
        )?;
        conn.execute(
            "DELETE FROM report_timeseries WHERE report_id = ?1",
            duckdb::params![id],
        )?;
        conn.execute(
            "DELETE FROM report_insights WHERE report_id = ?1",
            duckdb::params![id],
        )?;
        removed += conn.execute("DELETE FROM reports WHERE id = ?1", duckdb::params![id])?;
    }
    Ok(removed)
}

pub async fn insert_report_inner(db: &DuckDbBackend, report: NewReport) -> Result<ReportRecord> {
    let mut conn = db.conn.lock().await;

    let id = generate_id("report");
    let mut normalized = report.result;
    normalized.report_id = None;
    normalized.analysis = None;
    let normalized_json = serde_json::to_string(&normalized)?;

    let tx = conn.transaction()?;
    tx.execute(
        r#"
        INSERT INTO reports (
            id,
            title,
            property_id,
            start_date,
            end_date,
            comparison_start,
            comparison_end,
            normalized_metrics,
            ai_analysis,
            created_at
        ) VALUES (
            ?1, ?2, ?3,
            CAST(?4 AS DATE), CAST(?5 AS DATE), CAST(?6 AS DATE), CAST(?7 AS DATE),
            ?8, NULL, CAST(?9 AS TIMESTAMP)
        )
        "#,
        duckdb::params![
            id,
            report.title,
            report.property_id,
            normalized.current_range.start().to_string(),
            normalized.current_range.end().to_string(),
            normalized.comparison_range.start().to_string(),
            normalized.comparison_range.end().to_string(),
            normalized_json,
            timestamp_now(),
        ],
    )?;
    insert_snapshot(&tx, &id, Period::Current, &report.current)?;
    insert_snapshot(&tx, &id, Period::Comparison, &report.comparison)?;
    tx.commit()?;

    get_report_by_id(&conn, &id)?.ok_or_else(|| anyhow!("insert_failed"))
}

pub async fn get_report_inner(db: &DuckDbBackend, report_id: &str) -> Result<Option<ReportRecord>> {
    let conn = db.conn.lock().await;
    get_report_by_id(&conn, report_id)
}

pub async fn get_reports_inner(db: &DuckDbBackend, ids: &[String]) -> Result<Vec<ReportRecord>> {
    let conn = db.conn.lock().await;
    let mut seen = std::collections::HashSet::new();
    let mut reports = Vec::new();
    for id in ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        if let Some(report) = get_report_by_id(&conn, id)? {
            reports.push(report);
        }
    }
    reports.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
    Ok(reports)
}

pub async fn list_reports_inner(db: &DuckDbBackend, limit: usize) -> Result<Vec<ReportSummary>> {
    let conn = db.conn.lock().await;
    let mut stmt = conn.prepare(
        r#"
        SELECT
            id,
            title,
            property_id,
            CAST(start_date AS VARCHAR),
            CAST(end_date AS VARCHAR),
            CAST(comparison_start AS VARCHAR),
            CAST(comparison_end AS VARCHAR),
            normalized_metrics,
            ai_analysis,
            CAST(created_at AS VARCHAR)
        FROM reports
        ORDER BY created_at DESC, id DESC
        LIMIT ?1
        "#,
    )?;
    let rows = stmt.query_map(duckdb::params![limit as i64], map_report_row)?;

    let mut reports = Vec::new();
    for row in rows {
        let row = row?;
        let metric_count = parse_normalized(&row.id, &row.normalized_metrics)
            .map(|n| n.metrics.len() as i64)
            .unwrap_or(0);
        reports.push(ReportSummary {
            start_date: parse_date(&row.start_date)?,
            end_date: parse_date(&row.end_date)?,
            comparison_start: parse_date(&row.comparison_start)?,
            comparison_end: parse_date(&row.comparison_end)?,
            metric_count,
            has_analysis: row.ai_analysis.is_some(),
            id: row.id,
            title: row.title,
            property_id: row.property_id,
            created_at: row.created_at,
        });
    }
    Ok(reports)
}

pub async fn get_timeseries_inner(
    db: &DuckDbBackend,
    report_id: &str,
) -> Result<Vec<StoredTimeseriesRow>> {
    let conn = db.conn.lock().await;
    let mut stmt = conn.prepare(
        r#"
        SELECT period, CAST(day AS VARCHAR), metrics
        FROM report_timeseries
        WHERE report_id = ?1
        ORDER BY CASE period WHEN 'current' THEN 0 ELSE 1 END, day ASC
        "#,
    )?;
    let rows = stmt.query_map(duckdb::params![report_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut series = Vec::new();
    for row in rows {
        let (period_raw, day, metrics_json) = row?;
        let period =
            Period::parse(&period_raw).ok_or_else(|| anyhow!("invalid stored period {period_raw:?}"))?;
        let metrics: BTreeMap<String, f64> = serde_json::from_str(&metrics_json)?;
        series.push(StoredTimeseriesRow {
            period,
            date: parse_date(&day)?,
            metrics,
        });
    }
    Ok(series)
}

pub async fn update_analysis_inner(
    db: &DuckDbBackend,
    report_id: &str,
    analysis: &AiAnalysis,
    model: &str,
) -> Result<bool> {
    let mut conn = db.conn.lock().await;
    let analysis_json = serde_json::to_string(analysis)?;

    let tx = conn.transaction()?;
    let exists: i64 = tx
        .prepare("SELECT COUNT(*) FROM reports WHERE id = ?1")?
        .query_row(duckdb::params![report_id], |row| row.get(0))?;
    if exists == 0 {
        return Ok(false);
    }

    tx.execute(
        "UPDATE reports SET ai_analysis = ?1 WHERE id = ?2",
        duckdb::params![analysis_json, report_id],
    )?;
    tx.execute(
        r#"INSERT INTO report_insights (id, report_id, summary, analysis, model, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, CAST(?6 AS TIMESTAMP))"#,
        duckdb::params![
            generate_id("insight"),
            report_id,
            analysis.summary,
            analysis_json,
            model,
            timestamp_now(),
        ],
    )?;
    tx.commit()?;
    Ok(true)
}

pub async fn delete_reports_inner(db: &DuckDbBackend, ids: &[String]) -> Result<usize> {
    let mut conn = db.conn.lock().await;
    let tx = conn.transaction()?;
    let removed = delete_ids(&tx, ids)?;
    tx.commit()?;
    Ok(removed)
}

pub async fn purge_older_than_inner(db: &DuckDbBackend, days: i64) -> Result<usize> {
    let cutoff = format_timestamp(chrono::Utc::now().naive_utc() - Duration::days(days));
    let mut conn = db.conn.lock().await;
    let tx = conn.transaction()?;

    let expired: Vec<String> = {
        let mut stmt =
            tx.prepare("SELECT id FROM reports WHERE created_at < CAST(?1 AS TIMESTAMP)")?;
        let rows = stmt.query_map(duckdb::params![cutoff], |row| row.get::<_, String>(0))?;
        let ids = rows.collect::<Result<Vec<String>, duckdb::Error>>()?;
        ids
    };
    let removed = delete_ids(&tx, &expired)?;
    tx.commit()?;

    if removed > 0 {
        info!(removed, days, "Purged expired reports");
    }
    Ok(removed)
}

/// Snapshot of the per-period totals stored for a report, in insertion
/// order. Used by tests and diagnostics.
pub async fn get_totals_inner(
    db: &DuckDbBackend,
    report_id: &str,
    period: Period,
) -> Result<Vec<(String, f64)>> {
    let conn = db.conn.lock().await;
    let mut stmt = conn.prepare(
        "SELECT metric, value FROM report_totals WHERE report_id = ?1 AND period = ?2 ORDER BY position",
    )?;
    let rows = stmt.query_map(duckdb::params![report_id, period.as_str()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
    })?;
    let mut totals = Vec::new();
    for row in rows {
        totals.push(row?);
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_rejects_garbage() {
        assert!(parse_date("2024-02-30").is_err());
        assert!(parse_date("yesterday").is_err());
        assert!(parse_date("2024-02-29").is_ok());
    }

    #[test]
    fn invalid_normalized_payload_is_dropped() {
        assert!(parse_normalized("report_x", "{not-json}").is_none());
        assert!(parse_normalized("report_x", r#"{"metrics": []}"#).is_none());
    }

    #[test]
    fn analysis_parse_tolerates_missing_lists() {
        let analysis =
            parse_analysis("report_x", Some(r#"{"summary":"ok"}"#)).expect("analysis");
        assert_eq!(analysis.summary, "ok");
        assert!(parse_analysis("report_x", None).is_none());
    }
}
