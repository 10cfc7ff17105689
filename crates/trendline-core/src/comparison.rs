//! Period-over-period comparison engine.
//!
//! Everything here is pure: no I/O, no clocks, no shared state. The live
//! report path and the mock generator both go through [`compute_change`] so
//! the zero-comparison policy can never drift between them.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::analysis::AiAnalysis;
use crate::error::CoreError;

/// Percentage reported when the comparison value is zero and the current
/// value is not. A flat "up from nothing" marker, not a real ratio.
pub const PCT_FROM_ZERO: f64 = 100.0;

/// One named total for a period, as produced by the analytics source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTotal {
    pub metric: String,
    pub value: f64,
}

impl MetricTotal {
    pub fn new(metric: impl Into<String>, value: f64) -> Self {
        Self {
            metric: metric.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricChange {
    pub metric: String,
    pub current: f64,
    pub comparison: f64,
    pub abs_change: f64,
    pub pct_change: f64,
}

/// Inclusive calendar-date range. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DateRangeParts")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct DateRangeParts {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<DateRangeParts> for DateRange {
    type Error = CoreError;

    fn try_from(parts: DateRangeParts) -> Result<Self, Self::Error> {
        DateRange::new(parts.start, parts.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, CoreError> {
        if end < start {
            return Err(CoreError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar days covered, both ends included.
    pub fn day_count(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// The unit returned by report generation and stored as the report's
/// normalized payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub metrics: Vec<MetricChange>,
    pub current_range: DateRange,
    pub comparison_range: DateRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AiAnalysis>,
}

/// Pull an overflowed result back to the nearest finite value. NaN only
/// arises from non-finite inputs and maps to zero.
fn saturate(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(f64::MIN, f64::MAX)
    }
}

/// Build the change record for one metric.
///
/// Both derived fields are always finite. When `current - comparison` or the
/// percentage overflows, the result saturates at `f64::MAX` or `f64::MIN`.
pub fn compute_change(metric: impl Into<String>, current: f64, comparison: f64) -> MetricChange {
    let abs_change = saturate(current - comparison);
    let pct_change = if comparison == 0.0 {
        if current == 0.0 {
            0.0
        } else {
            PCT_FROM_ZERO
        }
    } else {
        saturate((abs_change / comparison) * 100.0)
    };

    MetricChange {
        metric: metric.into(),
        current,
        comparison,
        abs_change,
        pct_change,
    }
}

/// Join two totals lists by metric name and compute per-metric deltas.
///
/// Output order is first-seen: every current-side metric in input order,
/// then comparison-only metrics in input order. A metric missing on one side
/// counts as zero there. Repeated names within one list overwrite the earlier
/// value but keep the first position.
pub fn compute_changes(current: &[MetricTotal], comparison: &[MetricTotal]) -> Vec<MetricChange> {
    let mut order: Vec<(&str, f64, f64)> = Vec::with_capacity(current.len() + comparison.len());
    let mut index: HashMap<&str, usize> = HashMap::new();

    for total in current {
        match index.get(total.metric.as_str()) {
            Some(&i) => order[i].1 = total.value,
            None => {
                index.insert(total.metric.as_str(), order.len());
                order.push((total.metric.as_str(), total.value, 0.0));
            }
        }
    }

    for total in comparison {
        match index.get(total.metric.as_str()) {
            Some(&i) => order[i].2 = total.value,
            None => {
                index.insert(total.metric.as_str(), order.len());
                order.push((total.metric.as_str(), 0.0, total.value));
            }
        }
    }

    order
        .into_iter()
        .map(|(metric, cur, cmp)| compute_change(metric, cur, cmp))
        .collect()
}

/// The period of equal length that ends the day before `current` starts.
///
/// Fails when that period would begin before the earliest representable
/// calendar date.
pub fn calculate_comparison_range(current: &DateRange) -> Result<DateRange, CoreError> {
    let out_of_range = || CoreError::OutOfRange {
        start: current.start,
        end: current.end,
    };
    let duration = current.day_count();
    let end = current
        .start
        .checked_sub_signed(Duration::days(1))
        .ok_or_else(out_of_range)?;
    let start = end
        .checked_sub_signed(Duration::days(duration - 1))
        .ok_or_else(out_of_range)?;
    Ok(DateRange { start, end })
}
