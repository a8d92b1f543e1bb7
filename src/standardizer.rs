// Column standardization (z-scores) fitted on training data only.

use log::{debug, info, warn};
use ndarray::{Array1, ArrayView2, Axis, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_width, AnomalyError, Result};
use crate::stages::StandardizedFeatures;

/// Standard deviations below this are treated as zero variance.
pub const STD_EPSILON: f64 = 1e-9;

/// What to do with a training column whose standard deviation is (near) zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ZeroVariancePolicy {
    /// Replace the stddev by [`STD_EPSILON`]. The column is all zeros on the
    /// training set; any deviation on new data is amplified, which surfaces
    /// as a large anomaly score.
    #[default]
    EpsilonFloor,
    /// Fail the fit with [`AnomalyError::DegenerateRange`].
    Reject,
}

/// Per-column mean and (population) standard deviation learned from a
/// training matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    /// Shape: (n_features)
    mean: Array1<f64>,
    /// Sanitized stddevs, every entry is `>= STD_EPSILON`.
    /// Shape: (n_features)
    std_dev: Array1<f64>,
    /// Indices of columns whose training stddev was floored.
    zero_variance_columns: Vec<usize>,
}

impl Standardizer {
    /// Learns column means and standard deviations (`ddof = 0`).
    ///
    /// # Errors
    /// `InsufficientSamples` for an empty matrix, `NonFiniteValue` for NaN or
    /// infinite entries, `DegenerateRange` for a constant column under
    /// [`ZeroVariancePolicy::Reject`].
    pub fn fit(training: ArrayView2<f64>, policy: ZeroVariancePolicy) -> Result<Self> {
        let (n_samples, n_features) = training.dim();
        if n_samples == 0 {
            return Err(AnomalyError::InsufficientSamples {
                context: "standardizer fit",
                required: 1,
                actual: 0,
            });
        }
        if training.iter().any(|v| !v.is_finite()) {
            return Err(AnomalyError::NonFiniteValue {
                context: "standardizer training matrix".to_string(),
            });
        }

        let mean = training
            .mean_axis(Axis(0))
            .ok_or(AnomalyError::InsufficientSamples {
                context: "standardizer fit",
                required: 1,
                actual: n_samples,
            })?;
        let raw_std = training.std_axis(Axis(0), 0.0);

        let mut zero_variance_columns = Vec::new();
        for (column, &s) in raw_std.iter().enumerate() {
            if s < STD_EPSILON {
                if policy == ZeroVariancePolicy::Reject {
                    return Err(AnomalyError::DegenerateRange {
                        context: format!("standardizer column {}", column),
                        value: mean[column],
                    });
                }
                zero_variance_columns.push(column);
            }
        }
        if !zero_variance_columns.is_empty() {
            warn!(
                "{} of {} columns have zero training variance; flooring their stddev at {:e}.",
                zero_variance_columns.len(),
                n_features,
                STD_EPSILON
            );
        }
        let std_dev = raw_std.mapv(|s| s.max(STD_EPSILON));

        info!("Fitted standardizer on {} samples x {} features.", n_samples, n_features);
        Ok(Self { mean, std_dev, zero_variance_columns })
    }

    /// Applies `(x - mean) / std_dev` column-wise, one row per rayon task.
    ///
    /// # Errors
    /// `DimensionMismatch` if `x` does not have the training column count,
    /// `NonFiniteValue` for NaN or infinite entries.
    pub fn transform(&self, x: ArrayView2<f64>) -> Result<StandardizedFeatures> {
        ensure_width("standardizer transform", self.n_features(), x.ncols())?;
        if x.iter().any(|v| !v.is_finite()) {
            return Err(AnomalyError::NonFiniteValue {
                context: "standardizer input matrix".to_string(),
            });
        }

        let mut data = x.to_owned();
        data.axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|mut row| {
                Zip::from(&mut row)
                    .and(&self.mean)
                    .and(&self.std_dev)
                    .for_each(|v, &m, &s| *v = (*v - m) / s);
            });
        debug!("Standardized {} rows.", data.nrows());
        Ok(StandardizedFeatures::from_standardized(data))
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Sanitized standard deviations used as divisors.
    pub fn std_dev(&self) -> &Array1<f64> {
        &self.std_dev
    }

    pub fn zero_variance_columns(&self) -> &[usize] {
        &self.zero_variance_columns
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Checks a deserialized standardizer.
    pub(crate) fn validate(&self) -> Result<()> {
        ensure_width("standardizer std_dev", self.mean.len(), self.std_dev.len())?;
        if self.mean.iter().any(|v| !v.is_finite()) {
            return Err(AnomalyError::InvalidModel(
                "standardizer mean contains non-finite values".to_string(),
            ));
        }
        if self.std_dev.iter().any(|&s| !s.is_finite() || s < STD_EPSILON) {
            return Err(AnomalyError::InvalidModel(
                "standardizer std_dev must be finite and at least STD_EPSILON".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn training_set_has_zero_mean_unit_std() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let x = Array2::from_shape_fn((200, 5), |(_, j)| {
            rng.gen_range(-10.0..10.0) * (j as f64 + 1.0) + j as f64
        });
        let standardizer = Standardizer::fit(x.view(), ZeroVariancePolicy::default()).unwrap();
        let z = standardizer.transform(x.view()).unwrap();

        let means = z.data().mean_axis(Axis(0)).unwrap();
        let stds = z.data().std_axis(Axis(0), 0.0);
        for j in 0..5 {
            assert_abs_diff_eq!(means[j], 0.0, epsilon = 1e-10);
            assert_abs_diff_eq!(stds[j], 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn statistics_come_from_training_data_only() {
        let train = array![[0.0, 10.0], [2.0, 30.0]];
        let standardizer = Standardizer::fit(train.view(), ZeroVariancePolicy::default()).unwrap();
        let test = array![[4.0, 20.0]];
        let z = standardizer.transform(test.view()).unwrap();
        assert_abs_diff_eq!(z.data()[[0, 0]], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(z.data()[[0, 1]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn constant_column_is_floored_not_divided_by_zero() {
        let train = array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0]];
        let standardizer =
            Standardizer::fit(train.view(), ZeroVariancePolicy::EpsilonFloor).unwrap();
        assert_eq!(standardizer.zero_variance_columns(), &[1]);
        assert_eq!(standardizer.std_dev()[1], STD_EPSILON);

        let z = standardizer.transform(train.view()).unwrap();
        assert!(z.data().iter().all(|v| v.is_finite()));
        assert!(z.data().column(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn constant_column_rejected_under_reject_policy() {
        let train = array![[1.0, 5.0], [2.0, 5.0]];
        let err = Standardizer::fit(train.view(), ZeroVariancePolicy::Reject).unwrap_err();
        match err {
            AnomalyError::DegenerateRange { context, value } => {
                assert!(context.contains("column 1"));
                assert_eq!(value, 5.0);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn width_mismatch_is_reported() {
        let train = array![[1.0, 2.0], [3.0, 4.0]];
        let standardizer = Standardizer::fit(train.view(), ZeroVariancePolicy::default()).unwrap();
        let err = standardizer.transform(array![[1.0, 2.0, 3.0]].view()).unwrap_err();
        assert!(matches!(
            err,
            AnomalyError::DimensionMismatch { expected: 2, actual: 3, .. }
        ));
    }

    #[test]
    fn empty_and_non_finite_inputs_fail() {
        let empty = Array2::<f64>::zeros((0, 3));
        assert!(matches!(
            Standardizer::fit(empty.view(), ZeroVariancePolicy::default()),
            Err(AnomalyError::InsufficientSamples { .. })
        ));
        let nan = array![[1.0, f64::NAN], [2.0, 3.0]];
        assert!(matches!(
            Standardizer::fit(nan.view(), ZeroVariancePolicy::default()),
            Err(AnomalyError::NonFiniteValue { .. })
        ));

        let standardizer =
            Standardizer::fit(array![[1.0, 2.0], [2.0, 3.0]].view(), ZeroVariancePolicy::default())
                .unwrap();
        assert!(matches!(
            standardizer.transform(array![[1.5, f64::INFINITY]].view()),
            Err(AnomalyError::NonFiniteValue { .. })
        ));
    }
}
