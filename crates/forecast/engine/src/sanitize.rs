//! Clamping of untrusted forecasts to declared metric bounds.
//!
//! Out-of-bounds output is corrected, never rejected. The interval and the
//! point value are clamped independently.

use forecast_types::{ConfidenceInterval, MetricBounds};
use tracing::{debug, warn};

/// Clamp a prediction and its confidence interval to `bounds`.
///
/// With a lower bound, an interval lying wholly below it collapses onto the
/// bound, otherwise only its lower end is raised. The upper bound is then
/// applied the same way from above. The value is clamped against each bound
/// that is set.
pub fn sanitize(
    interval: ConfidenceInterval,
    value: f64,
    bounds: &MetricBounds,
) -> (ConfidenceInterval, f64) {
    if bounds.is_unbounded() {
        debug!(interval = %interval, value, "No bounds declared, forecast left unchanged");
        return (interval, value);
    }

    let mut lower = interval.lower();
    let mut upper = interval.upper();

    if let Some(bound) = bounds.lower {
        if upper < bound {
            lower = bound;
            upper = bound;
        } else if lower < bound {
            lower = bound;
        }
    }

    if let Some(bound) = bounds.upper {
        if lower > bound {
            lower = bound;
            upper = bound;
        } else if upper > bound {
            upper = bound;
        }
    }

    let sanitized_interval = ConfidenceInterval::new(lower, upper);
    if sanitized_interval != interval {
        warn!(
            before = %interval,
            after = %sanitized_interval,
            "Confidence interval clamped to metric bounds"
        );
    }

    let mut sanitized_value = value;
    if let Some(bound) = bounds.lower {
        if sanitized_value < bound {
            sanitized_value = bound;
        }
    }
    if let Some(bound) = bounds.upper {
        if sanitized_value > bound {
            sanitized_value = bound;
        }
    }

    if sanitized_value != value {
        warn!(
            before = value,
            after = sanitized_value,
            "Prediction value clamped to metric bounds"
        );
    }

    (sanitized_interval, sanitized_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn interval(raw: &str) -> ConfidenceInterval {
        raw.parse().unwrap()
    }

    #[test]
    fn test_interval_below_lower_bound_collapses() {
        let (sanitized, value) = sanitize(interval("-20,-2"), -5.0, &MetricBounds::between(0.0, 100.0));
        assert_eq!(sanitized.to_string(), "0,0");
        assert_eq!(value, 0.0);
    }

    #[test]
    fn test_no_bounds_leaves_forecast_unchanged() {
        let (sanitized, value) = sanitize(interval("30,55"), 42.0, &MetricBounds::unbounded());
        assert_eq!(sanitized.to_string(), "30,55");
        assert_eq!(value, 42.0);
    }

    #[test]
    fn test_partial_overlap_raises_lower_end_only() {
        let (sanitized, value) = sanitize(interval("-3,7"), 2.0, &MetricBounds::new(Some(0.0), None));
        assert_eq!(sanitized.as_pair(), [0.0, 7.0]);
        assert_eq!(value, 2.0);
    }

    #[test]
    fn test_interval_above_upper_bound_collapses() {
        let (sanitized, value) = sanitize(interval("120,150"), 130.0, &MetricBounds::between(0.0, 100.0));
        assert_eq!(sanitized.as_pair(), [100.0, 100.0]);
        assert_eq!(value, 100.0);
    }

    #[test]
    fn test_value_clamped_without_interval_change() {
        let (sanitized, value) = sanitize(interval("10,20"), 250.0, &MetricBounds::new(None, Some(100.0)));
        assert_eq!(sanitized.as_pair(), [10.0, 20.0]);
        assert_eq!(value, 100.0);
    }

    fn ordered_bounds() -> impl Strategy<Value = MetricBounds> {
        (
            proptest::option::of(-1e6f64..1e6),
            proptest::option::of(-1e6f64..1e6),
        )
            .prop_map(|(a, b)| match (a, b) {
                (Some(a), Some(b)) if a > b => MetricBounds::new(Some(b), Some(a)),
                (a, b) => MetricBounds::new(a, b),
            })
    }

    proptest! {
        #[test]
        fn prop_value_within_bounds(
            bounds in ordered_bounds(),
            a in -1e7f64..1e7,
            b in -1e7f64..1e7,
            value in -1e7f64..1e7,
        ) {
            let (sanitized, clamped) = sanitize(ConfidenceInterval::new(a, b), value, &bounds);

            prop_assert!(sanitized.lower() <= sanitized.upper());
            if let Some(lower) = bounds.lower {
                prop_assert!(clamped >= lower);
                prop_assert!(sanitized.lower() >= lower);
            }
            if let Some(upper) = bounds.upper {
                prop_assert!(clamped <= upper);
                prop_assert!(sanitized.upper() <= upper);
            }
            if bounds.is_unbounded() {
                prop_assert_eq!(clamped, value);
                prop_assert_eq!(sanitized, ConfidenceInterval::new(a, b));
            }
        }

        #[test]
        fn prop_sanitize_is_idempotent(
            bounds in ordered_bounds(),
            a in -1e7f64..1e7,
            b in -1e7f64..1e7,
            value in -1e7f64..1e7,
        ) {
            let once = sanitize(ConfidenceInterval::new(a, b), value, &bounds);
            let twice = sanitize(once.0, once.1, &bounds);
            prop_assert_eq!(once, twice);
        }
    }
}
