// End-to-end PCA reconstruction-error anomaly detector

use log::{debug, info};
use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Instant;

use crate::error::{ensure_width, AnomalyError, Result};
use crate::evaluation::{roc_auc, Label};
use crate::normalizer::MinMaxNormalizer;
use crate::pca::{FitStrategy, PcaBasis};
use crate::scoring::reconstruction_errors;
use crate::stages::{AnomalyScores, NormalizedScores, StandardizedFeatures};
use crate::standardizer::{Standardizer, ZeroVariancePolicy};

/// Parameters of a detector fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Number of principal components kept (k).
    pub n_components: usize,
    pub fit_strategy: FitStrategy,
    pub zero_variance_policy: ZeroVariancePolicy,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            n_components: 10,
            fit_strategy: FitStrategy::Exact,
            zero_variance_policy: ZeroVariancePolicy::EpsilonFloor,
        }
    }
}

impl DetectorConfig {
    /// Checks everything that can be checked without data.
    pub fn validate(&self) -> Result<()> {
        if self.n_components == 0 {
            return Err(AnomalyError::invalid_parameter(
                "n_components",
                self.n_components,
                "must be greater than 0",
            ));
        }
        if let FitStrategy::Randomized { oversamples, .. } = self.fit_strategy {
            if oversamples == 0 {
                return Err(AnomalyError::invalid_parameter(
                    "oversamples",
                    oversamples,
                    "randomized fit needs at least one oversample",
                ));
            }
        }
        Ok(())
    }
}

/// Unfitted detector.
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    config: DetectorConfig,
}

/// Raw and normalized scores for one batch, row-aligned with the input.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredBatch {
    pub raw: AnomalyScores,
    pub normalized: NormalizedScores,
}

/// Result of scoring a labelled batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub auc: f64,
    pub n_samples: usize,
    pub n_anomalies: usize,
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Fits standardizer, basis and score normalizer on `train`, in that
    /// order. Each reduction finishes before the next stage starts, and a
    /// failure in any of them aborts the whole fit.
    pub fn fit(&self, train: ArrayView2<f64>) -> Result<FittedDetector> {
        let overall_start_time = Instant::now();
        info!(
            "Fitting anomaly detector: {} samples x {} features, k={}, strategy={:?}",
            train.nrows(),
            train.ncols(),
            self.config.n_components,
            self.config.fit_strategy
        );

        let standardizer = Standardizer::fit(train, self.config.zero_variance_policy)?;
        let standardized = standardizer.transform(train)?;

        let basis = PcaBasis::fit(
            &standardized,
            self.config.n_components,
            self.config.fit_strategy,
        )?;

        let training_scores = score_standardized(&basis, &standardized)?;
        let normalizer = MinMaxNormalizer::fit(training_scores.values().view())?;
        debug!(
            "Training reconstruction error range: [{}, {}]",
            normalizer.min(),
            normalizer.max()
        );

        info!("Fitted anomaly detector in {:?}", overall_start_time.elapsed());
        Ok(FittedDetector {
            config: self.config,
            standardizer,
            basis,
            normalizer,
        })
    }
}

fn score_standardized(
    basis: &PcaBasis,
    standardized: &StandardizedFeatures,
) -> Result<AnomalyScores> {
    let projections = basis.transform(standardized)?;
    let reconstruction = basis.reconstruct(&projections)?;
    reconstruction_errors(standardized, &reconstruction)
}

/// Detector with every stage fitted. Read-only; safe to share across threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedDetector {
    config: DetectorConfig,
    standardizer: Standardizer,
    basis: PcaBasis,
    normalizer: MinMaxNormalizer,
}

impl FittedDetector {
    /// Runs standardize → project → reconstruct → score → normalize.
    ///
    /// # Errors
    /// `DimensionMismatch` if `x` does not have the training width.
    pub fn score(&self, x: ArrayView2<f64>) -> Result<ScoredBatch> {
        let start_time = Instant::now();
        let standardized = self.standardizer.transform(x)?;
        let raw = score_standardized(&self.basis, &standardized)?;
        let normalized = self.normalizer.transform(&raw);
        debug!("Scored {} samples in {:?}", raw.len(), start_time.elapsed());
        Ok(ScoredBatch { raw, normalized })
    }

    /// Normalized scores only.
    pub fn score_normalized(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self.score(x)?.normalized.into_inner())
    }

    /// Scores `x` and computes the ROC-AUC of the normalized scores against
    /// `labels`.
    pub fn evaluate(&self, x: ArrayView2<f64>, labels: &[Label]) -> Result<Evaluation> {
        ensure_width("evaluation labels", x.nrows(), labels.len())?;
        let batch = self.score(x)?;
        let auc = roc_auc(labels, batch.normalized.values().view())?;
        let n_anomalies = labels.iter().filter(|l| l.is_anomaly()).count();
        info!(
            "Evaluated {} samples ({} anomalies): ROC-AUC = {:.6}",
            labels.len(),
            n_anomalies,
            auc
        );
        Ok(Evaluation {
            auc,
            n_samples: labels.len(),
            n_anomalies,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn standardizer(&self) -> &Standardizer {
        &self.standardizer
    }

    pub fn basis(&self) -> &PcaBasis {
        &self.basis
    }

    pub fn normalizer(&self) -> &MinMaxNormalizer {
        &self.normalizer
    }

    pub fn n_features(&self) -> usize {
        self.standardizer.n_features()
    }

    /// Saves the fitted detector with bincode.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref()).map_err(|e| AnomalyError::io(path.as_ref(), e))?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| {
                AnomalyError::Serialization(format!("failed to serialize detector: {}", e))
            })?;
        info!("Saved detector to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads a detector saved with [`FittedDetector::save`], validating every
    /// stage.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| AnomalyError::io(path.as_ref(), e))?;
        let mut reader = BufReader::new(file);
        let detector: FittedDetector =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
                .map_err(|e| {
                    AnomalyError::Serialization(format!("failed to deserialize detector: {}", e))
                })?;

        detector.standardizer.validate()?;
        detector.basis.validate()?;
        if detector.standardizer.n_features() != detector.basis.n_features() {
            return Err(AnomalyError::InvalidModel(format!(
                "standardizer has {} features but basis has {}",
                detector.standardizer.n_features(),
                detector.basis.n_features()
            )));
        }
        MinMaxNormalizer::from_range(detector.normalizer.min(), detector.normalizer.max())?;
        Ok(detector)
    }

    /// Like [`FittedDetector::load`], but rejects a detector trained on a
    /// different feature width.
    pub fn load_for_width<P: AsRef<Path>>(path: P, expected_features: usize) -> Result<Self> {
        let detector = Self::load(path)?;
        ensure_width("loaded detector", expected_features, detector.n_features())?;
        Ok(detector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::NamedTempFile;

    #[test]
    fn zero_components_rejected_by_config() {
        let config = DetectorConfig { n_components: 0, ..DetectorConfig::default() };
        assert!(matches!(
            AnomalyDetector::new(config),
            Err(AnomalyError::InvalidParameter { name: "n_components", .. })
        ));
    }

    #[test]
    fn randomized_without_oversamples_rejected() {
        let config = DetectorConfig {
            fit_strategy: FitStrategy::Randomized { oversamples: 0, power_iterations: 2, seed: 1 },
            ..DetectorConfig::default()
        };
        assert!(matches!(
            AnomalyDetector::new(config),
            Err(AnomalyError::InvalidParameter { name: "oversamples", .. })
        ));
    }

    #[test]
    fn components_beyond_width_fail_at_fit() {
        let detector = AnomalyDetector::new(DetectorConfig {
            n_components: 3,
            ..DetectorConfig::default()
        })
        .unwrap();
        let train = array![[1.0, 2.0], [2.0, 1.0], [3.0, 5.0]];
        assert!(matches!(
            detector.fit(train.view()),
            Err(AnomalyError::InvalidParameter { name: "k", .. })
        ));
    }

    #[test]
    fn evaluate_checks_label_count() {
        let detector = AnomalyDetector::new(DetectorConfig {
            n_components: 1,
            ..DetectorConfig::default()
        })
        .unwrap();
        let train = array![[1.0, 2.0], [2.0, 1.0], [3.0, 5.0], [0.0, 4.0]];
        let fitted = detector.fit(train.view()).unwrap();
        assert!(matches!(
            fitted.evaluate(train.view(), &[Label::Normal]),
            Err(AnomalyError::DimensionMismatch { expected: 4, actual: 1, .. })
        ));
    }

    #[test]
    fn load_rejects_standardizer_and_basis_of_different_widths() {
        let train = array![[1.0, 2.0, 0.5], [2.0, 1.0, 0.7], [3.0, 5.0, 0.1]];
        let inconsistent = FittedDetector {
            config: DetectorConfig { n_components: 1, ..DetectorConfig::default() },
            standardizer: Standardizer::fit(train.view(), ZeroVariancePolicy::default()).unwrap(),
            basis: PcaBasis::from_parts(array![[0.0, 1.0]], array![0.0, 0.0], array![1.0])
                .unwrap(),
            normalizer: MinMaxNormalizer::from_range(0.0, 1.0).unwrap(),
        };
        let temp_file = NamedTempFile::new().unwrap();
        inconsistent.save(temp_file.path()).unwrap();

        match FittedDetector::load(temp_file.path()) {
            Err(AnomalyError::InvalidModel(message)) => {
                assert!(message.contains("3 features"))
            }
            other => panic!("expected InvalidModel, got {:?}", other),
        }
    }

    #[test]
    fn load_rejects_degenerate_normalizer() {
        let train = array![[1.0, 2.0], [2.0, 1.0], [3.0, 5.0], [0.0, 4.0]];
        let mut fitted = AnomalyDetector::new(DetectorConfig {
            n_components: 1,
            ..DetectorConfig::default()
        })
        .unwrap()
        .fit(train.view())
        .unwrap();
        fitted.normalizer = MinMaxNormalizer { min: 0.5, max: 0.5 };
        let temp_file = NamedTempFile::new().unwrap();
        fitted.save(temp_file.path()).unwrap();

        assert!(matches!(
            FittedDetector::load(temp_file.path()),
            Err(AnomalyError::DegenerateRange { .. })
        ));
    }
}
