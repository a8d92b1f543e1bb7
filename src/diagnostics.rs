// src/diagnostics.rs
#![cfg(feature = "enable-detector-diagnostics")]

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::detector::FittedDetector;
use crate::error::Result;

/// Summary statistics of a score vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Fit-quality report for a detector on its training matrix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitDiagnostics {
    pub n_features: usize,
    pub n_components: usize,
    /// Share of training variance per kept component.
    pub explained_variance_ratio: Vec<f64>,
    /// Running total of `explained_variance_ratio`.
    pub cumulative_variance_ratio: Vec<f64>,
    /// ||I - C·Cᵀ||_F of the component matrix.
    pub basis_orthogonality_error: f64,
    /// Raw reconstruction errors on `train`.
    pub training_scores: ScoreSummary,
    /// Columns whose training stddev was floored.
    pub zero_variance_columns: Vec<usize>,
}

/// Builds a [`FitDiagnostics`] report by re-scoring `train`.
pub fn diagnose(detector: &FittedDetector, train: ArrayView2<f64>) -> Result<FitDiagnostics> {
    let basis = detector.basis();
    let ratio = basis.explained_variance_ratio().to_vec();
    let cumulative = ratio
        .iter()
        .scan(0.0, |acc, r| {
            *acc += r;
            Some(*acc)
        })
        .collect();

    let gram = basis.components().dot(&basis.components().t());
    let orthogonality_error = (&gram - &Array2::<f64>::eye(gram.nrows()))
        .mapv(|v| v * v)
        .sum()
        .sqrt();

    let scores = detector.score(train)?.raw.into_inner();
    let training_scores = ScoreSummary {
        count: scores.len(),
        min: scores.iter().cloned().fold(f64::INFINITY, f64::min),
        max: scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        mean: scores.mean().unwrap_or(f64::NAN),
    };

    Ok(FitDiagnostics {
        n_features: basis.n_features(),
        n_components: basis.n_components(),
        explained_variance_ratio: ratio,
        cumulative_variance_ratio: cumulative,
        basis_orthogonality_error: orthogonality_error,
        training_scores,
        zero_variance_columns: detector.standardizer().zero_variance_columns().to_vec(),
    })
}
