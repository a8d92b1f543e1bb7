use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while fitting, scoring, evaluating or persisting a detector.
///
/// Every variant carries the values that triggered it. None of them are
/// recovered internally.
#[derive(Debug, Error)]
pub enum AnomalyError {
    #[error("invalid parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("degenerate range in {context}: every value equals {value}")]
    DegenerateRange { context: String, value: f64 },

    #[error("labels contain only the {class} class ({count} samples); AUC needs both classes")]
    InsufficientClassDiversity { class: &'static str, count: usize },

    #[error("{context} needs at least {required} samples, got {actual}")]
    InsufficientSamples {
        context: &'static str,
        required: usize,
        actual: usize,
    },

    #[error("non-finite value (NaN or infinity) in {context}")]
    NonFiniteValue { context: String },

    #[error("linear algebra backend failure: {0}")]
    Linalg(String),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid model: {0}")]
    InvalidModel(String),
}

pub type Result<T> = std::result::Result<T, AnomalyError>;

impl AnomalyError {
    pub(crate) fn invalid_parameter(
        name: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        AnomalyError::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AnomalyError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Fails with [`AnomalyError::DimensionMismatch`] unless `actual == expected`.
pub(crate) fn ensure_width(context: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(AnomalyError::DimensionMismatch {
            context,
            expected,
            actual,
        });
    }
    Ok(())
}
