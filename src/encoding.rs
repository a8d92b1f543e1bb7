// Categorical column indexing and one-hot encoding

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ensure_width, AnomalyError, Result};

/// Maps the levels of one categorical column to indices and one-hot vectors.
///
/// Levels are indexed by descending training frequency, ties broken
/// alphabetically. Index `n_levels()` is reserved for values never seen
/// during fit, so encoding new data never fails on an unknown category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    levels: Vec<String>,
    index: HashMap<String, usize>,
}

impl CategoricalEncoder {
    pub fn fit<S: AsRef<str>>(values: &[S]) -> Result<Self> {
        if values.is_empty() {
            return Err(AnomalyError::InsufficientSamples {
                context: "categorical encoder fit",
                required: 1,
                actual: 0,
            });
        }
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for value in values {
            *counts.entry(value.as_ref()).or_insert(0) += 1;
        }
        let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
        ranked.sort_by(|(a_name, a_count), (b_name, b_count)| {
            b_count.cmp(a_count).then_with(|| a_name.cmp(b_name))
        });

        let levels: Vec<String> = ranked.into_iter().map(|(name, _)| name.to_string()).collect();
        let index = levels
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Ok(Self { levels, index })
    }

    /// Index of `value`, or the reserved unknown index `n_levels()`.
    pub fn index_of(&self, value: &str) -> usize {
        self.index.get(value).copied().unwrap_or(self.levels.len())
    }

    pub fn is_known(&self, value: &str) -> bool {
        self.index.contains_key(value)
    }

    /// Levels in index order.
    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// Width of the one-hot block: every level plus the unknown slot.
    pub fn width(&self) -> usize {
        self.levels.len() + 1
    }

    /// Writes the one-hot encoding of `value` into `out`.
    ///
    /// # Errors
    /// `DimensionMismatch` if `out.len() != self.width()`.
    pub fn encode_into(&self, value: &str, out: &mut [f64]) -> Result<()> {
        ensure_width("one-hot block", self.width(), out.len())?;
        out.iter_mut().for_each(|v| *v = 0.0);
        out[self.index_of(value)] = 1.0;
        Ok(())
    }

    pub fn encode(&self, value: &str) -> Vec<f64> {
        let mut out = vec![0.0; self.width()];
        out[self.index_of(value)] = 1.0;
        out
    }
}
