// PCA reconstruction-error anomaly detection

#![doc = include_str!("../README.md")]

pub mod dataset;
#[cfg(feature = "enable-detector-diagnostics")]
pub mod diagnostics;
pub mod detector;
pub mod encoding;
pub mod error;
pub mod evaluation;
pub mod linalg_backends;
pub mod normalizer;
pub mod pca;
pub mod scoring;
pub mod stages;
pub mod standardizer;

pub use dataset::{
    filter_normal, train_test_split, ConnectionRecord, FeatureAssembler, LabeledMatrix,
};
pub use detector::{AnomalyDetector, DetectorConfig, Evaluation, FittedDetector, ScoredBatch};
pub use encoding::CategoricalEncoder;
pub use error::{AnomalyError, Result};
pub use evaluation::{roc_auc, Label};
pub use normalizer::{MinMaxNormalizer, RANGE_TOLERANCE};
pub use pca::{FitStrategy, PcaBasis};
pub use scoring::{reconstruction_errors, score_row};
pub use stages::{
    AnomalyScores, NormalizedScores, Projections, Reconstruction, StandardizedFeatures,
};
pub use standardizer::{Standardizer, ZeroVariancePolicy, STD_EPSILON};
