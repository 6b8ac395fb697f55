//! Jenks natural breaks classification.
//!
//! Dynamic programming over sorted values minimizing within-class variance.
//! Used to pick the density threshold separating hotspot cells from
//! background.

/// Compute `classes` break values for the given data.
///
/// Returns the upper boundary of each class, non-decreasing, the last one
/// being the maximum value. When the input has fewer distinct values than
/// requested classes, the sorted distinct values are returned as-is.
pub fn jenks_breaks(values: &[f64], classes: usize) -> Vec<f64> {
    if classes == 0 || values.is_empty() {
        return Vec::new();
    }

    let mut data: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    data.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if data.is_empty() {
        return Vec::new();
    }

    let mut distinct: Vec<f64> = data.clone();
    distinct.dedup();
    if distinct.len() <= classes {
        return distinct;
    }

    let n = data.len();
    // lower[i][j]: index of the first element of class j in the optimal
    // partition of data[..i]; var[i][j]: its accumulated variance.
    let mut lower = vec![vec![0usize; classes + 1]; n + 1];
    let mut var = vec![vec![0.0f64; classes + 1]; n + 1];

    for j in 1..=classes {
        lower[1][j] = 1;
        for i in 2..=n {
            var[i][j] = f64::INFINITY;
        }
    }

    for l in 2..=n {
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut w = 0.0;
        let mut variance = 0.0;

        for m in 1..=l {
            let idx = l - m + 1;
            let val = data[idx - 1];
            w += 1.0;
            sum += val;
            sum_sq += val * val;
            variance = sum_sq - (sum * sum) / w;

            if idx != 1 {
                for j in 2..=classes {
                    if var[l][j] >= variance + var[idx - 1][j - 1] {
                        lower[l][j] = idx;
                        var[l][j] = variance + var[idx - 1][j - 1];
                    }
                }
            }
        }

        lower[l][1] = 1;
        var[l][1] = variance;
    }

    let mut breaks = vec![0.0; classes];
    breaks[classes - 1] = data[n - 1];
    let mut k = n;
    for j in (2..=classes).rev() {
        let id = lower[k][j] - 1;
        breaks[j - 2] = data[id - 1];
        k = id;
    }
    breaks
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_classic_partition() {
        // Three obvious bands
        let values = vec![1.0, 1.1, 1.2, 5.0, 5.1, 5.2, 9.0, 9.1, 9.2];
        let breaks = jenks_breaks(&values, 3);
        assert_eq!(breaks.len(), 3);
        assert_eq!(breaks[2], 9.2);
        // The first two breaks land at the ends of the low and mid bands
        assert!(breaks[0] <= 1.2 + 1e-9);
        assert!(breaks[1] <= 5.2 + 1e-9 && breaks[1] >= 5.0 - 1e-9);
    }

    #[test]
    fn test_fewer_distinct_values_than_classes() {
        let values = vec![2.0, 2.0, 7.0, 7.0];
        let breaks = jenks_breaks(&values, 5);
        assert_eq!(breaks, vec![2.0, 7.0]);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(jenks_breaks(&[], 3).is_empty());
        assert!(jenks_breaks(&[1.0, 2.0], 0).is_empty());
        assert_eq!(jenks_breaks(&[4.0], 3), vec![4.0]);
        assert!(jenks_breaks(&[f64::NAN], 2).is_empty());
    }

    proptest! {
        #[test]
        fn prop_breaks_monotone_and_counted(
            values in prop::collection::vec(0.0..1000.0f64, 1..60),
            classes in 1usize..8,
        ) {
            let breaks = jenks_breaks(&values, classes);

            let mut distinct: Vec<f64> = values.clone();
            distinct.sort_by(|a, b| a.partial_cmp(b).unwrap());
            distinct.dedup();
            let expected = classes.min(distinct.len());
            prop_assert_eq!(breaks.len(), expected);

            for pair in breaks.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }

            let max = distinct.last().copied().unwrap();
            prop_assert_eq!(*breaks.last().unwrap(), max);
        }
    }
}
