// ROC-AUC evaluation of anomaly scores against ground truth

use log::debug;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_width, AnomalyError, Result};

/// Binary ground truth. `Anomaly` is the positive class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Normal,
    Anomaly,
}

impl Label {
    /// Derives the binary label from a KDD-style attack name: `normal` (with
    /// or without the trailing `.`, any case) is `Normal`, every attack name
    /// is `Anomaly`.
    pub fn from_original_label(original: &str) -> Self {
        let name = original.trim().trim_end_matches('.');
        if name.eq_ignore_ascii_case("normal") {
            Label::Normal
        } else {
            Label::Anomaly
        }
    }

    pub fn is_anomaly(self) -> bool {
        self == Label::Anomaly
    }
}

impl From<bool> for Label {
    fn from(is_anomaly: bool) -> Self {
        if is_anomaly { Label::Anomaly } else { Label::Normal }
    }
}

/// Area under the ROC curve, computed from ranks (Mann-Whitney U).
///
/// Equals the probability that a random anomaly scores higher than a random
/// normal sample; tied pairs count 0.5 because tied scores share their
/// average rank. Only the order of the scores matters, so any strictly
/// increasing transform of the scores yields the same value.
///
/// # Errors
/// - `DimensionMismatch` if `labels` and `scores` differ in length.
/// - `InsufficientClassDiversity` if only one class is present.
/// - `NonFiniteValue` if a score is NaN or infinite.
pub fn roc_auc(labels: &[Label], scores: ArrayView1<f64>) -> Result<f64> {
    ensure_width("ROC-AUC labels vs scores", labels.len(), scores.len())?;
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(AnomalyError::NonFiniteValue {
            context: "ROC-AUC scores".to_string(),
        });
    }

    let n_pos = labels.iter().filter(|l| l.is_anomaly()).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 {
        return Err(AnomalyError::InsufficientClassDiversity { class: "normal", count: n_neg });
    }
    if n_neg == 0 {
        return Err(AnomalyError::InsufficientClassDiversity { class: "anomaly", count: n_pos });
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // Walk tie groups, giving each member the group's average 1-based rank.
    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        let average_rank = (start + 1 + end) as f64 / 2.0;
        let positives_in_group = order[start..end]
            .iter()
            .filter(|&&i| labels[i].is_anomaly())
            .count();
        positive_rank_sum += average_rank * positives_in_group as f64;
        start = end;
    }

    let (n_pos_f, n_neg_f) = (n_pos as f64, n_neg as f64);
    let u_statistic = positive_rank_sum - n_pos_f * (n_pos_f + 1.0) / 2.0;
    let auc = u_statistic / (n_pos_f * n_neg_f);
    debug!("ROC-AUC over {} positives and {} negatives: {:.6}", n_pos, n_neg, auc);
    Ok(auc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};
    use Label::{Anomaly, Normal};

    #[test]
    fn perfect_separation_is_one_and_inverse_is_zero() {
        let labels = [Normal, Normal, Anomaly, Anomaly];
        let scores = array![0.1, 0.2, 0.8, 0.9];
        assert_abs_diff_eq!(roc_auc(&labels, scores.view()).unwrap(), 1.0, epsilon = 1e-12);
        let reversed = scores.mapv(|s| -s);
        assert_abs_diff_eq!(roc_auc(&labels, reversed.view()).unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn ties_contribute_one_half() {
        let labels = [Normal, Anomaly];
        assert_abs_diff_eq!(
            roc_auc(&labels, array![0.5, 0.5].view()).unwrap(),
            0.5,
            epsilon = 1e-12
        );

        // pairs: (a=0.4 vs n=0.4) tie, (a=0.4 vs n=0.1) win, (a=0.9 vs both) wins -> 3.5 / 4
        let labels = [Normal, Normal, Anomaly, Anomaly];
        let scores = array![0.4, 0.1, 0.4, 0.9];
        assert_abs_diff_eq!(roc_auc(&labels, scores.view()).unwrap(), 0.875, epsilon = 1e-12);
    }

    #[test]
    fn matches_pairwise_definition() {
        let labels = [Anomaly, Normal, Normal, Anomaly, Normal, Anomaly, Normal];
        let scores = array![0.3, 0.3, 0.7, 0.9, 0.1, 0.2, 0.9];
        let mut wins = 0.0;
        let mut pairs = 0.0;
        for (i, li) in labels.iter().enumerate() {
            for (j, lj) in labels.iter().enumerate() {
                if li.is_anomaly() && !lj.is_anomaly() {
                    pairs += 1.0;
                    if scores[i] > scores[j] {
                        wins += 1.0;
                    } else if scores[i] == scores[j] {
                        wins += 0.5;
                    }
                }
            }
        }
        assert_abs_diff_eq!(
            roc_auc(&labels, scores.view()).unwrap(),
            wins / pairs,
            epsilon = 1e-12
        );
    }

    #[test]
    fn invariant_under_monotonic_transform() {
        let labels = [Normal, Anomaly, Normal, Anomaly, Normal];
        let scores: Array1<f64> = array![1.0, 4.0, 2.5, 3.0, 0.5];
        let base = roc_auc(&labels, scores.view()).unwrap();
        let scaled = scores.mapv(|s| (s - 0.5) / 3.5);
        let exped = scores.mapv(f64::exp);
        assert_abs_diff_eq!(roc_auc(&labels, scaled.view()).unwrap(), base, epsilon = 1e-12);
        assert_abs_diff_eq!(roc_auc(&labels, exped.view()).unwrap(), base, epsilon = 1e-12);
    }

    #[test]
    fn single_class_labels_fail() {
        let err = roc_auc(&[Normal, Normal], array![0.1, 0.2].view()).unwrap_err();
        assert!(matches!(
            err,
            AnomalyError::InsufficientClassDiversity { class: "normal", count: 2 }
        ));
        let err = roc_auc(&[Anomaly], array![0.1].view()).unwrap_err();
        assert!(matches!(
            err,
            AnomalyError::InsufficientClassDiversity { class: "anomaly", count: 1 }
        ));
    }

    #[test]
    fn length_mismatch_and_nan_fail() {
        assert!(matches!(
            roc_auc(&[Normal, Anomaly], array![0.1].view()),
            Err(AnomalyError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            roc_auc(&[Normal, Anomaly], array![0.1, f64::NAN].view()),
            Err(AnomalyError::NonFiniteValue { .. })
        ));
    }

    #[test]
    fn kdd_label_names_map_to_binary_labels() {
        assert_eq!(Label::from_original_label("normal."), Normal);
        assert_eq!(Label::from_original_label(" Normal "), Normal);
        assert_eq!(Label::from_original_label("smurf."), Anomaly);
        assert_eq!(Label::from_original_label("neptune"), Anomaly);
        assert_eq!(Label::from(true), Anomaly);
    }
}
