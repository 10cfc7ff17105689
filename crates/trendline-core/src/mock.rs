//! Randomized demo data for exercising the report pipeline without any
//! external calls.

use rand::Rng;

use crate::comparison::{compute_change, MetricChange};

/// Metric names with the plausible range their comparison value is drawn from.
pub const MOCK_CATALOG: [(&str, f64, f64); 5] = [
    ("sessions", 800.0, 6000.0),
    ("totalUsers", 600.0, 4500.0),
    ("screenPageViews", 1500.0, 15000.0),
    ("conversions", 40.0, 300.0),
    ("engagedSessions", 400.0, 3500.0),
];

const TREND_MIN: f64 = 0.8;
const TREND_MAX: f64 = 1.3;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn build_mock_metrics() -> Vec<MetricChange> {
    build_mock_metrics_with(&mut rand::thread_rng())
}

pub fn build_mock_metrics_with<R: Rng + ?Sized>(rng: &mut R) -> Vec<MetricChange> {
    MOCK_CATALOG
        .iter()
        .map(|&(metric, low, high)| {
            let comparison = rng.gen_range(low..=high);
            let trend = rng.gen_range(TREND_MIN..=TREND_MAX);
            let current = (comparison * trend).max(0.0);

            let mut change = compute_change(metric, round2(current), round2(comparison));
            change.abs_change = round2(change.abs_change);
            change.pct_change = round2(change.pct_change);
            change
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn is_two_places(value: f64) -> bool {
        ((value * 100.0).round() - value * 100.0).abs() < 1e-6
    }

    #[test]
    fn produces_one_change_per_catalog_entry() {
        let metrics = build_mock_metrics();
        let names: Vec<&str> = metrics.iter().map(|m| m.metric.as_str()).collect();
        let expected: Vec<&str> = MOCK_CATALOG.iter().map(|(name, _, _)| *name).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn values_stay_in_range_and_agree_with_engine() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            for (change, (_, low, high)) in build_mock_metrics_with(&mut rng).iter().zip(MOCK_CATALOG) {
                assert!(change.comparison >= low - 0.01 && change.comparison <= high + 0.01);
                assert!(change.current >= 0.0);
                assert!(change.current <= change.comparison * TREND_MAX + 0.01);
                assert!(change.current >= change.comparison * TREND_MIN - 0.01);

                assert!((change.abs_change - (change.current - change.comparison)).abs() <= 0.011);
                let engine = compute_change(&change.metric, change.current, change.comparison);
                assert!((change.pct_change - engine.pct_change).abs() <= 0.006);
                assert!(change.pct_change.is_finite());

                for value in [
                    change.current,
                    change.comparison,
                    change.abs_change,
                    change.pct_change,
                ] {
                    assert!(is_two_places(value), "{value} not rounded to 2 places");
                }
            }
        }
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let a = build_mock_metrics_with(&mut StdRng::seed_from_u64(9));
        let b = build_mock_metrics_with(&mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
