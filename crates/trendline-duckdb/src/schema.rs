/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// All statements use `IF NOT EXISTS` so they are safe to re-run on every
/// startup.
///
/// `memory_limit` comes from `Config.duckdb_memory_limit`
/// (env `TRENDLINE_DUCKDB_MEMORY`, default `"1GB"`).
///
/// No FOREIGN KEY constraints: DuckDB checks them immediately at statement
/// time, so child tables are cleaned up explicitly inside the same
/// transaction as the parent delete (see `reports::delete_ids`).
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- REPORTS
-- ===========================================
CREATE TABLE IF NOT EXISTS reports (
    id                  VARCHAR PRIMARY KEY,       -- 'report_' + 21 random chars
    title               VARCHAR NOT NULL,
    property_id         VARCHAR NOT NULL,
    start_date          DATE NOT NULL,
    end_date            DATE NOT NULL,
    comparison_start    DATE NOT NULL,
    comparison_end      DATE NOT NULL,
    normalized_metrics  VARCHAR NOT NULL,          -- ComparisonResult JSON
    ai_analysis         VARCHAR,                   -- AiAnalysis JSON, overwritten on regenerate
    created_at          TIMESTAMP NOT NULL         -- UTC, written by the application
);
CREATE INDEX IF NOT EXISTS idx_reports_created
    ON reports(created_at DESC);

-- ===========================================
-- REPORT CHILD ROWS (one set per period: 'current' | 'comparison')
-- ===========================================
CREATE TABLE IF NOT EXISTS report_raw_payloads (
    report_id       VARCHAR NOT NULL,
    period          VARCHAR NOT NULL,
    payload         VARCHAR NOT NULL,              -- provider response JSON, verbatim
    PRIMARY KEY (report_id, period)
);

CREATE TABLE IF NOT EXISTS report_totals (
    report_id       VARCHAR NOT NULL,
    period          VARCHAR NOT NULL,
    position        INTEGER NOT NULL,
    metric          VARCHAR NOT NULL,
    value           DOUBLE NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_report_totals_report
    ON report_totals(report_id, period, position);

CREATE TABLE IF NOT EXISTS report_timeseries (
    report_id       VARCHAR NOT NULL,
    period          VARCHAR NOT NULL,
    day             DATE NOT NULL,
    metrics         VARCHAR NOT NULL               -- JSON object metric -> value
);
CREATE INDEX IF NOT EXISTS idx_report_timeseries_report
    ON report_timeseries(report_id, period, day);

-- ===========================================
-- NARRATIVE HISTORY (every stored analysis, newest last)
-- ===========================================
CREATE TABLE IF NOT EXISTS report_insights (
    id              VARCHAR PRIMARY KEY,
    report_id       VARCHAR NOT NULL,
    summary         VARCHAR NOT NULL,
    analysis        VARCHAR NOT NULL,
    model           VARCHAR NOT NULL,
    created_at      TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_report_insights_report
    ON report_insights(report_id, created_at);
"#
    )
}

