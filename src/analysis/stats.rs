use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::sampler::{AxisId, SampleSet};

/// Summary of one axis' resting readings.
///
/// `std_dev` is the population standard deviation: the session observes the
/// whole rest-state population rather than estimating it from a subset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisStats {
    pub count: usize,
    pub min: i32,
    pub max: i32,
    pub range: i64,
    pub mean: f64,
    pub std_dev: f64,
    /// max(|min|, |max|)
    pub peak: u32,
}

impl AxisStats {
    /// Statistics for `samples`, or `None` when there is no data.
    pub fn compute(samples: &[i32]) -> Option<Self> {
        let (&first, rest) = samples.split_first()?;
        let count = samples.len();

        let (mut min, mut max, mut sum) = (first, first, first as i64);
        for &v in rest {
            min = min.min(v);
            max = max.max(v);
            sum += v as i64;
        }

        let mean = sum as f64 / count as f64;
        let variance = samples
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / count as f64;

        Some(Self {
            count,
            min,
            max,
            range: max as i64 - min as i64,
            mean,
            std_dev: variance.sqrt(),
            peak: min.unsigned_abs().max(max.unsigned_abs()),
        })
    }
}

/// Statistics for every axis that produced at least one sample
pub fn axis_stats(samples: &SampleSet) -> BTreeMap<AxisId, AxisStats> {
    AxisId::ALL
        .into_iter()
        .filter_map(|axis| AxisStats::compute(samples.series(axis)).map(|stats| (axis, stats)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_series_has_no_stats() {
        assert_eq!(AxisStats::compute(&[]), None);
    }

    #[test]
    fn constant_series_has_zero_spread() {
        for (v, n) in [(0, 1), (-37, 5), (1200, 64)] {
            let samples = vec![v; n];
            let stats = AxisStats::compute(&samples).unwrap();
            assert_eq!(stats.count, n);
            assert_eq!(stats.min, v);
            assert_eq!(stats.max, v);
            assert_eq!(stats.range, 0);
            assert_eq!(stats.mean, v as f64);
            assert_eq!(stats.std_dev, 0.0);
            assert_eq!(stats.peak, v.unsigned_abs());
        }
    }

    #[test]
    fn uses_population_standard_deviation() {
        // mean 5, squared deviations sum to 32 over 8 samples
        let stats = AxisStats::compute(&[2, 4, 4, 4, 5, 5, 7, 9]).unwrap();
        assert_eq!(stats.mean, 5.0);
        assert!((stats.std_dev - 2.0).abs() < 1e-12);
        assert_eq!(stats.range, 7);
        assert_eq!(stats.peak, 9);
    }

    #[test]
    fn peak_takes_the_larger_magnitude() {
        let stats = AxisStats::compute(&[-40, 3, 12]).unwrap();
        assert_eq!(stats.peak, 40);
        assert_eq!(stats.range, 52);
    }

    #[test]
    fn extreme_values_do_not_overflow() {
        let stats = AxisStats::compute(&[i32::MIN, i32::MAX]).unwrap();
        assert_eq!(stats.range, u32::MAX as i64);
        assert_eq!(stats.peak, 1u32 << 31);
        assert!(stats.mean >= stats.min as f64 && stats.mean <= stats.max as f64);
    }

    #[test]
    fn mean_lies_between_min_and_max() {
        let series: [&[i32]; 4] = [&[1, 2, 3], &[-5, 100, 7, 7], &[32767, -32768], &[0, 0, 1]];
        for samples in series {
            let stats = AxisStats::compute(samples).unwrap();
            assert!(stats.min as f64 <= stats.mean);
            assert!(stats.mean <= stats.max as f64);
            assert!(stats.std_dev >= 0.0);
            assert!(stats.range >= 0);
        }
    }

    #[test]
    fn only_populated_axes_are_reported() {
        let mut set = SampleSet::new();
        set.push(AxisId::Ry, 4);
        set.push(AxisId::X, -2);

        let stats = axis_stats(&set);
        assert_eq!(stats.keys().copied().collect::<Vec<_>>(), vec![AxisId::X, AxisId::Ry]);
    }
}
