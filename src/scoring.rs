// Reconstruction-error anomaly scores

use ndarray::{Array1, ArrayView1, Zip};

use crate::error::{ensure_width, AnomalyError, Result};
use crate::stages::{AnomalyScores, Reconstruction, StandardizedFeatures};

/// Squared L2 norm of the residual, `Σ (oᵢ - rᵢ)²`.
///
/// # Errors
/// `DimensionMismatch` if the vectors differ in length.
pub fn score_row(original: ArrayView1<f64>, reconstructed: ArrayView1<f64>) -> Result<f64> {
    ensure_width("anomaly score", original.len(), reconstructed.len())?;
    Ok(Zip::from(&original)
        .and(&reconstructed)
        .fold(0.0, |acc, &o, &r| acc + (o - r) * (o - r)))
}

/// Scores every row independently.
///
/// `original` must be the standardized matrix the reconstruction was
/// computed from, since the basis lives in standardized space.
///
/// # Errors
/// `DimensionMismatch` if the two matrices differ in shape.
pub fn reconstruction_errors(
    original: &StandardizedFeatures,
    reconstructed: &Reconstruction,
) -> Result<AnomalyScores> {
    ensure_width("anomaly scoring (rows)", original.num_samples(), reconstructed.num_samples())?;
    ensure_width(
        "anomaly scoring (features)",
        original.num_features(),
        reconstructed.num_features(),
    )?;

    let mut values = Array1::<f64>::zeros(original.num_samples());
    Zip::from(&mut values)
        .and(original.data().rows())
        .and(reconstructed.data().rows())
        .par_for_each(|score, o, r| {
            *score = Zip::from(&o).and(&r).fold(0.0, |acc, &a, &b| acc + (a - b) * (a - b));
        });

    if values.iter().any(|v| !v.is_finite()) {
        return Err(AnomalyError::NonFiniteValue {
            context: "reconstruction errors".to_string(),
        });
    }
    Ok(AnomalyScores { values })
}
