// Min-max scaling of anomaly scores

use ndarray::{ArrayView1, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{AnomalyError, Result};
use crate::stages::{AnomalyScores, NormalizedScores};

/// Relative width below which a score range counts as degenerate.
///
/// A range is degenerate when `max - min <= RANGE_TOLERANCE * max(1, |max|)`.
/// Training scores of a basis that reconstructs every training row are
/// rounding residue (around 1e-30) and fall under this bound.
pub const RANGE_TOLERANCE: f64 = 1e-12;

/// `(s - min) / (max - min)` with `min`/`max` taken from a reference score set.
///
/// Scores outside the reference range map outside `[0, 1]`; nothing is clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxNormalizer {
    pub(crate) min: f64,
    pub(crate) max: f64,
}

impl MinMaxNormalizer {
    /// Learns the range of `reference`.
    ///
    /// # Errors
    /// - `InsufficientSamples` if `reference` is empty.
    /// - `NonFiniteValue` if it contains NaN or infinity.
    /// - `DegenerateRange` if the values span no more than
    ///   [`RANGE_TOLERANCE`] relative to their magnitude.
    pub fn fit(reference: ArrayView1<f64>) -> Result<Self> {
        if reference.is_empty() {
            return Err(AnomalyError::InsufficientSamples {
                context: "score normalizer fit",
                required: 1,
                actual: 0,
            });
        }
        if reference.iter().any(|v| !v.is_finite()) {
            return Err(AnomalyError::NonFiniteValue {
                context: "score normalizer reference".to_string(),
            });
        }
        let min = reference.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = reference.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Self::from_range(min, max)
    }

    /// Builds a normalizer from a known range.
    ///
    /// # Errors
    /// `InvalidParameter` if `max < min`, `DegenerateRange` if the range is
    /// within [`RANGE_TOLERANCE`].
    pub fn from_range(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() {
            return Err(AnomalyError::NonFiniteValue {
                context: "score normalizer range".to_string(),
            });
        }
        if max < min {
            return Err(AnomalyError::invalid_parameter(
                "max",
                max,
                format!("must be greater than min ({})", min),
            ));
        }
        if max - min <= RANGE_TOLERANCE * max.abs().max(1.0) {
            return Err(AnomalyError::DegenerateRange {
                context: "score normalizer".to_string(),
                value: min,
            });
        }
        Ok(Self { min, max })
    }

    pub fn transform_value(&self, score: f64) -> f64 {
        (score - self.min) / (self.max - self.min)
    }

    pub fn transform(&self, scores: &AnomalyScores) -> NormalizedScores {
        let mut values = scores.values().clone();
        Zip::from(&mut values).par_for_each(|v| *v = self.transform_value(*v));
        NormalizedScores { values }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn reference_extremes_map_to_zero_and_one() {
        let reference = array![4.0, 1.5, 9.0, 3.25];
        let normalizer = MinMaxNormalizer::fit(reference.view()).unwrap();
        assert_eq!(normalizer.transform_value(1.5), 0.0);
        assert_eq!(normalizer.transform_value(9.0), 1.0);
        assert_abs_diff_eq!(normalizer.transform_value(5.25), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn values_outside_reference_range_are_not_clamped() {
        let normalizer = MinMaxNormalizer::fit(array![0.0, 10.0].view()).unwrap();
        let scores = AnomalyScores { values: array![-5.0, 20.0] };
        let normalized = normalizer.transform(&scores);
        assert_abs_diff_eq!(normalized.values()[0], -0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(normalized.values()[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn constant_reference_is_degenerate() {
        let err = MinMaxNormalizer::fit(array![3.0, 3.0, 3.0].view()).unwrap_err();
        match err {
            AnomalyError::DegenerateRange { value, .. } => assert_eq!(value, 3.0),
            other => panic!("expected DegenerateRange, got {:?}", other),
        }
    }

    #[test]
    fn rounding_residue_range_is_degenerate() {
        let residue = array![1.2e-32, 3.1e-33, 7.7e-32];
        assert!(matches!(
            MinMaxNormalizer::fit(residue.view()),
            Err(AnomalyError::DegenerateRange { .. })
        ));
        // Large scores that agree to 1e-13 relative are still constant.
        assert!(matches!(
            MinMaxNormalizer::from_range(1.0e6, 1.0e6 + 1.0e-7),
            Err(AnomalyError::DegenerateRange { .. })
        ));
        assert!(MinMaxNormalizer::from_range(0.0, 1e-6).is_ok());
    }

    #[test]
    fn empty_and_non_finite_references_fail() {
        let empty = ndarray::Array1::<f64>::zeros(0);
        assert!(matches!(
            MinMaxNormalizer::fit(empty.view()),
            Err(AnomalyError::InsufficientSamples { .. })
        ));
        assert!(matches!(
            MinMaxNormalizer::fit(array![1.0, f64::INFINITY].view()),
            Err(AnomalyError::NonFiniteValue { .. })
        ));
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(matches!(
            MinMaxNormalizer::from_range(2.0, 1.0),
            Err(AnomalyError::InvalidParameter { name: "max", .. })
        ));
    }
}
