use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use trendline_core::analytics::{AnalyticsSnapshot, AnalyticsSource, TimeseriesRow};
use trendline_core::comparison::{DateRange, MetricTotal};
use trendline_core::config::GoogleConfig;

use super::oauth::{refresh_access_token, AccessToken};

pub const DATA_API_BASE: &str = "https://analyticsdata.googleapis.com/v1beta";

/// Tokens this close to expiry are refreshed instead of reused.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Upper bound on how long a cached token is trusted, whatever the grant says.
const MAX_TOKEN_LIFETIME_SECS: i64 = 86_400;

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expiry: DateTime<Utc>,
}

impl CachedToken {
    fn issued(access: AccessToken, now: DateTime<Utc>) -> Self {
        let lifetime = i64::try_from(access.expires_in)
            .unwrap_or(MAX_TOKEN_LIFETIME_SECS)
            .min(MAX_TOKEN_LIFETIME_SECS);
        Self {
            token: access.token,
            expiry: now + Duration::seconds(lifetime),
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) < self.expiry
    }
}

/// GA4 Data API client authenticated with a stored refresh token.
///
/// The access token is cached until shortly before it expires, so the two
/// fetches of one report share a single refresh grant.
pub struct GaClient {
    config: GoogleConfig,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl GaClient {
    pub fn new(config: GoogleConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            token: Mutex::new(None),
        }
    }

    /// A usable access token, refreshed only when the cached one is missing
    /// or about to expire. The lock is held across the refresh.
    async fn access_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.token.clone());
        }

        let access = refresh_access_token(&self.http, client_id, client_secret, refresh_token)
            .await?;
        debug!(expires_in = access.expires_in, "Refreshed GA access token");
        let token = CachedToken::issued(access, Utc::now());
        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }
}

/// Accepts both `123456` and `properties/123456`.
fn property_path(property_id: &str) -> String {
    let id = property_id.trim();
    let id = id.strip_prefix("properties/").unwrap_or(id);
    format!("properties/{id}")
}

fn run_report_body(range: &DateRange, metrics: &[String]) -> Value {
    json!({
        "dateRanges": [{
            "startDate": range.start().to_string(),
            "endDate": range.end().to_string(),
        }],
        "dimensions": [{ "name": "date" }],
        "metrics": metrics.iter().map(|m| json!({ "name": m })).collect::<Vec<_>>(),
    })
}

/// GA4 reports the `date` dimension as `YYYYMMDD`.
fn parse_ga_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

fn parse_metric_value(value: &Value) -> f64 {
    let parsed = match value {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Turn a `runReport` response into totals and daily rows.
///
/// Every requested metric appears in the totals, in request order, even when
/// the response has no rows. Dates that do not parse fall back to the start
/// of the range; values that do not parse count as zero.
pub fn parse_run_report(raw: Value, range: &DateRange, metrics: &[String]) -> AnalyticsSnapshot {
    let mut sums = vec![0.0; metrics.len()];
    let mut timeseries = Vec::new();

    let rows = raw
        .get("rows")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for row in rows {
        let date = row
            .pointer("/dimensionValues/0/value")
            .and_then(Value::as_str)
            .and_then(parse_ga_date)
            .unwrap_or_else(|| range.start());

        let mut values = BTreeMap::new();
        for (index, metric) in metrics.iter().enumerate() {
            let value = row
                .pointer(&format!("/metricValues/{index}/value"))
                .map(parse_metric_value)
                .unwrap_or(0.0);
            sums[index] += value;
            values.insert(metric.clone(), value);
        }
        timeseries.push(TimeseriesRow {
            date,
            metrics: values,
        });
    }

    let totals = metrics
        .iter()
        .zip(sums)
        .map(|(metric, value)| MetricTotal::new(metric.clone(), value))
        .collect();

    AnalyticsSnapshot {
        raw,
        totals,
        timeseries,
    }
}

#[async_trait]
impl AnalyticsSource for GaClient {
    fn missing_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.config.client_id.is_none() {
            missing.push("GA_OAUTH_CLIENT_ID");
        }
        if self.config.client_secret.is_none() {
            missing.push("GA_OAUTH_CLIENT_SECRET");
        }
        if self.config.refresh_token.is_none() {
            missing.push("GA_OAUTH_REFRESH_TOKEN");
        }
        missing
    }

    async fn fetch(
        &self,
        property_id: &str,
        range: &DateRange,
        metrics: &[String],
    ) -> Result<AnalyticsSnapshot> {
        let (Some(client_id), Some(client_secret), Some(refresh_token)) = (
            self.config.client_id.as_deref(),
            self.config.client_secret.as_deref(),
            self.config.refresh_token.as_deref(),
        ) else {
            bail!(
                "missing GA OAuth credentials: {}",
                self.missing_settings().join(", ")
            );
        };

        let token = self
            .access_token(client_id, client_secret, refresh_token)
            .await?;

        let url = format!("{DATA_API_BASE}/{}:runReport", property_path(property_id));
        debug!(%url, start = %range.start(), end = %range.end(), "Running GA4 report");
        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&run_report_body(range, metrics))
            .send()
            .await
            .context("analytics request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("analytics API returned {status}: {body}");
        }
        let raw: Value = resp.json().await.context("invalid analytics response")?;
        Ok(parse_run_report(raw, range, metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("date")
    }

    fn week() -> DateRange {
        DateRange::new(date("2024-03-01"), date("2024-03-07")).expect("range")
    }

    fn names(metrics: &[&str]) -> Vec<String> {
        metrics.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn rows_become_timeseries_and_totals() {
        let raw = json!({
            "rows": [
                {
                    "dimensionValues": [{ "value": "20240301" }],
                    "metricValues": [{ "value": "120" }, { "value": "80.5" }]
                },
                {
                    "dimensionValues": [{ "value": "20240302" }],
                    "metricValues": [{ "value": "30" }, { "value": "19.5" }]
                }
            ],
            "rowCount": 2
        });
        let snapshot = parse_run_report(raw.clone(), &week(), &names(&["sessions", "totalUsers"]));

        assert_eq!(snapshot.raw, raw);
        assert_eq!(
            snapshot.totals,
            vec![
                MetricTotal::new("sessions", 150.0),
                MetricTotal::new("totalUsers", 100.0)
            ]
        );
        assert_eq!(snapshot.timeseries.len(), 2);
        assert_eq!(snapshot.timeseries[1].date, date("2024-03-02"));
        assert_eq!(snapshot.timeseries[1].metrics["totalUsers"], 19.5);
    }

    #[test]
    fn bad_dates_and_values_fall_back() {
        let raw = json!({
            "rows": [{
                "dimensionValues": [{ "value": "(other)" }],
                "metricValues": [{ "value": "n/a" }]
            }]
        });
        let snapshot = parse_run_report(raw, &week(), &names(&["sessions", "conversions"]));

        let row = &snapshot.timeseries[0];
        assert_eq!(row.date, date("2024-03-01"));
        assert_eq!(row.metrics["sessions"], 0.0);
        assert_eq!(row.metrics["conversions"], 0.0);
    }

    #[test]
    fn empty_response_still_reports_every_metric() {
        let snapshot = parse_run_report(json!({}), &week(), &names(&["sessions", "eventCount"]));
        assert!(snapshot.timeseries.is_empty());
        assert_eq!(
            snapshot.totals,
            vec![
                MetricTotal::new("sessions", 0.0),
                MetricTotal::new("eventCount", 0.0)
            ]
        );
    }

    #[test]
    fn property_path_normalizes_prefix() {
        assert_eq!(property_path("123"), "properties/123");
        assert_eq!(property_path(" properties/123 "), "properties/123");
    }

    #[test]
    fn request_body_names_dimension_and_metrics() {
        let body = run_report_body(&week(), &names(&["sessions"]));
        assert_eq!(body["dateRanges"][0]["startDate"], "2024-03-01");
        assert_eq!(body["dateRanges"][0]["endDate"], "2024-03-07");
        assert_eq!(body["dimensions"][0]["name"], "date");
        assert_eq!(body["metrics"][0]["name"], "sessions");
    }

    #[test]
    fn missing_credentials_listed() {
        let client = GaClient::new(
            GoogleConfig {
                client_id: Some("id".to_string()),
                ..GoogleConfig::default()
            },
            reqwest::Client::new(),
        );
        assert_eq!(
            client.missing_settings(),
            vec!["GA_OAUTH_CLIENT_SECRET", "GA_OAUTH_REFRESH_TOKEN"]
        );
    }

    #[test]
    fn cached_token_goes_stale_before_expiry() {
        let now = Utc::now();
        let token = CachedToken::issued(
            AccessToken {
                token: "ya29".to_string(),
                expires_in: 3600,
            },
            now,
        );
        assert!(token.is_fresh(now));
        assert!(token.is_fresh(now + Duration::seconds(3500)));
        assert!(!token.is_fresh(now + Duration::seconds(3550)));
    }

    #[tokio::test]
    async fn fresh_token_reused_without_refresh() {
        let client = GaClient::new(GoogleConfig::default(), reqwest::Client::new());
        *client.token.lock().await = Some(CachedToken::issued(
            AccessToken {
                token: "cached".to_string(),
                expires_in: 3600,
            },
            Utc::now(),
        ));

        // A refresh would have to reach the network; the cached value comes back instead.
        let token = client
            .access_token("id", "secret", "1//refresh")
            .await
            .expect("token");
        assert_eq!(token, "cached");
    }
}
