//! Typed products of each pipeline stage.
//!
//! `Raw → Standardized → Projected → Reconstructed → Scored → Normalized`.
//! Every stage takes the previous stage's type, so a basis fitted in
//! standardized space can never be handed raw features.

use ndarray::{Array1, Array2};

/// Feature matrix after the training mean and stddev were applied.
/// Shape: `(n_samples, n_features)`
#[derive(Debug, Clone, PartialEq)]
pub struct StandardizedFeatures {
    pub(crate) data: Array2<f64>,
}

impl StandardizedFeatures {
    /// Wraps a matrix that is already standardized. Only
    /// [`Standardizer::transform`](crate::standardizer::Standardizer::transform)
    /// and in-crate tests construct this type.
    pub(crate) fn from_standardized(data: Array2<f64>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.data
    }

    pub fn num_samples(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_features(&self) -> usize {
        self.data.ncols()
    }
}

/// Coordinates of each sample in the principal subspace.
/// Shape: `(n_samples, k_components)`
#[derive(Debug, Clone, PartialEq)]
pub struct Projections {
    pub(crate) data: Array2<f64>,
}

impl Projections {
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn num_samples(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_components(&self) -> usize {
        self.data.ncols()
    }
}

/// Projections mapped back to standardized feature space.
/// Shape: `(n_samples, n_features)`
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    pub(crate) data: Array2<f64>,
}

impl Reconstruction {
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn num_samples(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_features(&self) -> usize {
        self.data.ncols()
    }
}

/// Sum of squared reconstruction residuals, one per sample. Non-negative.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyScores {
    pub(crate) values: Array1<f64>,
}

impl AnomalyScores {
    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn into_inner(self) -> Array1<f64> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Anomaly scores after min-max scaling. Not clamped to `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedScores {
    pub(crate) values: Array1<f64>,
}

impl NormalizedScores {
    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn into_inner(self) -> Array1<f64> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
