//! Analytics data-source abstraction.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::comparison::{DateRange, MetricTotal};

/// Metrics requested when the caller does not name any.
pub const DEFAULT_METRICS: [&str; 4] = ["sessions", "totalUsers", "eventCount", "conversions"];

/// One day of per-metric values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesRow {
    pub date: NaiveDate,
    pub metrics: BTreeMap<String, f64>,
}

/// Everything fetched for one date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    /// Provider response, kept verbatim.
    pub raw: serde_json::Value,
    pub totals: Vec<MetricTotal>,
    pub timeseries: Vec<TimeseriesRow>,
}

/// Which side of a comparison a stored row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Current,
    Comparison,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Current => "current",
            Period::Comparison => "comparison",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "current" => Some(Period::Current),
            "comparison" => Some(Period::Comparison),
            _ => None,
        }
    }
}

/// Normalize a caller-supplied metric list: trimmed, blanks dropped, falling
/// back to [`DEFAULT_METRICS`] when nothing is left.
pub fn resolve_metric_names(requested: &[String]) -> Vec<String> {
    let names: Vec<String> = requested
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        DEFAULT_METRICS.iter().map(|m| m.to_string()).collect()
    } else {
        names
    }
}

#[async_trait]
pub trait AnalyticsSource: Send + Sync + 'static {
    /// Settings this source needs that are not configured. Empty when the
    /// source is ready to fetch.
    fn missing_settings(&self) -> Vec<&'static str>;

    async fn fetch(
        &self,
        property_id: &str,
        range: &DateRange,
        metrics: &[String],
    ) -> anyhow::Result<AnalyticsSnapshot>;
}
