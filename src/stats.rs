//! Small statistics helpers shared by the ping sampler and the run summary.

use serde::Serialize;

/// Median of a set of values. Sorts the input in place.
///
/// Returns `None` for an empty slice.
pub fn median_f64(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let mid = values.len() / 2;

    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Arithmetic mean, or `None` when there is nothing to average.
pub fn mean_f64(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Average, maximum and minimum of one recorded metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSummary {
    pub average: f64,
    pub maximum: f64,
    pub minimum: f64,
    /// Number of values the summary was computed from
    pub count: usize,
}

impl MetricSummary {
    /// Summarize the present values of a series, skipping absent entries.
    pub fn from_series<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let present: Vec<f64> = values.into_iter().flatten().collect();
        let average = mean_f64(&present)?;

        let maximum = present.iter().copied().fold(f64::MIN, f64::max);
        let minimum = present.iter().copied().fold(f64::MAX, f64::min);

        Some(Self { average, maximum, minimum, count: present.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd() {
        let mut values = vec![18.0, 10.0, 14.0, 12.0, 15.0];
        assert_eq!(median_f64(&mut values), Some(14.0));
    }

    #[test]
    fn test_median_even() {
        let mut values = vec![40.0, 10.0, 30.0, 20.0];
        assert_eq!(median_f64(&mut values), Some(25.0));
    }

    #[test]
    fn test_median_empty() {
        let mut values: Vec<f64> = vec![];
        assert_eq!(median_f64(&mut values), None);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean_f64(&[10.0, 20.0, 30.0]), Some(20.0));
        assert_eq!(mean_f64(&[]), None);
    }

    #[test]
    fn test_summary_skips_absent_values() {
        let summary = MetricSummary::from_series(vec![
            None,
            Some(50.0),
            None,
            Some(30.0),
            Some(40.0),
        ])
        .unwrap();

        assert!((summary.average - 40.0).abs() < 0.001);
        assert_eq!(summary.maximum, 50.0);
        assert_eq!(summary.minimum, 30.0);
        assert_eq!(summary.count, 3);
    }

    #[test]
    fn test_summary_all_absent() {
        assert!(MetricSummary::from_series(vec![None, None]).is_none());
    }
}
