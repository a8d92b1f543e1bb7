// Connection records → numeric feature matrix + binary labels

use log::{info, warn};
use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::encoding::CategoricalEncoder;
use crate::error::{ensure_width, AnomalyError, Result};
use crate::evaluation::Label;

/// One network connection (a KDD Cup 99 row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: u64,
    /// Continuous and count features (duration, src_bytes, ...).
    pub numeric: Vec<f64>,
    /// Categorical features in a fixed column order (protocol_type, service, flag).
    pub categorical: Vec<String>,
    /// Attack name as found in the data, e.g. `normal.` or `smurf.`.
    pub original_label: String,
}

impl ConnectionRecord {
    pub fn label(&self) -> Label {
        Label::from_original_label(&self.original_label)
    }
}

/// Assembled matrix with per-row ids and labels, rows aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledMatrix {
    pub ids: Vec<u64>,
    /// Shape: (n_records, n_numeric + Σ one-hot widths)
    pub features: Array2<f64>,
    pub labels: Vec<Label>,
}

impl LabeledMatrix {
    pub fn num_anomalies(&self) -> usize {
        self.labels.iter().filter(|l| l.is_anomaly()).count()
    }
}

/// Turns records into fixed-width numeric rows: the numeric columns first,
/// then one one-hot block per categorical column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureAssembler {
    n_numeric: usize,
    encoders: Vec<CategoricalEncoder>,
}

impl FeatureAssembler {
    /// Fits one encoder per categorical column.
    ///
    /// # Errors
    /// `InsufficientSamples` for no records, `DimensionMismatch` if records
    /// disagree on their numeric or categorical width.
    pub fn fit(records: &[ConnectionRecord]) -> Result<Self> {
        let first = records.first().ok_or(AnomalyError::InsufficientSamples {
            context: "feature assembler fit",
            required: 1,
            actual: 0,
        })?;
        let n_numeric = first.numeric.len();
        let n_categorical = first.categorical.len();
        for record in records {
            ensure_width("record numeric columns", n_numeric, record.numeric.len())?;
            ensure_width("record categorical columns", n_categorical, record.categorical.len())?;
        }

        let encoders = (0..n_categorical)
            .map(|column| {
                let values: Vec<&str> = records
                    .iter()
                    .map(|r| r.categorical[column].as_str())
                    .collect();
                CategoricalEncoder::fit(&values)
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Fitted feature assembler: {} numeric columns, {} categorical columns, width {}.",
            n_numeric,
            n_categorical,
            n_numeric + encoders.iter().map(CategoricalEncoder::width).sum::<usize>()
        );
        Ok(Self { n_numeric, encoders })
    }

    pub fn width(&self) -> usize {
        self.n_numeric + self.encoders.iter().map(CategoricalEncoder::width).sum::<usize>()
    }

    pub fn encoders(&self) -> &[CategoricalEncoder] {
        &self.encoders
    }

    /// Builds the feature matrix, ids and labels for `records`.
    ///
    /// # Errors
    /// `DimensionMismatch` if a record does not have the fitted column counts.
    pub fn assemble(&self, records: &[ConnectionRecord]) -> Result<LabeledMatrix> {
        let width = self.width();
        let mut features = Array2::<f64>::zeros((records.len(), width));
        let mut unseen = 0usize;

        for (record, mut row) in records.iter().zip(features.rows_mut()) {
            ensure_width("record numeric columns", self.n_numeric, record.numeric.len())?;
            ensure_width(
                "record categorical columns",
                self.encoders.len(),
                record.categorical.len(),
            )?;

            let row = row
                .as_slice_mut()
                .ok_or_else(|| {
                    AnomalyError::InvalidModel("feature row is not contiguous".to_string())
                })?;
            row[..self.n_numeric].copy_from_slice(&record.numeric);
            let mut offset = self.n_numeric;
            for (encoder, value) in self.encoders.iter().zip(&record.categorical) {
                if !encoder.is_known(value) {
                    unseen += 1;
                }
                encoder.encode_into(value, &mut row[offset..offset + encoder.width()])?;
                offset += encoder.width();
            }
        }
        if unseen > 0 {
            warn!("{} categorical values were not seen during fit; encoded as unknown.", unseen);
        }

        Ok(LabeledMatrix {
            ids: records.iter().map(|r| r.id).collect(),
            features,
            labels: records.iter().map(ConnectionRecord::label).collect(),
        })
    }
}

/// Shuffles with a seeded ChaCha8 generator and splits into
/// `(train, test)`, with `round(train_fraction * n)` training records.
///
/// # Errors
/// `InvalidParameter` unless `0 < train_fraction < 1`.
pub fn train_test_split(
    records: &[ConnectionRecord],
    train_fraction: f64,
    seed: u64,
) -> Result<(Vec<ConnectionRecord>, Vec<ConnectionRecord>)> {
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(AnomalyError::invalid_parameter(
            "train_fraction",
            train_fraction,
            "must lie strictly between 0 and 1",
        ));
    }
    let mut shuffled = records.to_vec();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);
    let n_train = (train_fraction * shuffled.len() as f64).round() as usize;
    let test = shuffled.split_off(n_train);
    Ok((shuffled, test))
}

/// Keeps only records labelled normal, for fitting on clean traffic.
pub fn filter_normal(records: &[ConnectionRecord]) -> Vec<ConnectionRecord> {
    records
        .iter()
        .filter(|r| r.label() == Label::Normal)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, numeric: &[f64], categorical: &[&str], label: &str) -> ConnectionRecord {
        ConnectionRecord {
            id,
            numeric: numeric.to_vec(),
            categorical: categorical.iter().map(|s| s.to_string()).collect(),
            original_label: label.to_string(),
        }
    }

    fn sample_records() -> Vec<ConnectionRecord> {
        vec![
            record(1, &[0.0, 181.0], &["tcp", "http"], "normal."),
            record(2, &[0.0, 239.0], &["tcp", "http"], "normal."),
            record(3, &[0.0, 1032.0], &["icmp", "ecr_i"], "smurf."),
            record(4, &[2.0, 0.0], &["udp", "private"], "normal."),
        ]
    }

    #[test]
    fn assembles_numeric_then_one_hot_blocks() {
        let records = sample_records();
        let assembler = FeatureAssembler::fit(&records).unwrap();
        // 2 numeric + (3 protocols + unknown) + (3 services + unknown)
        assert_eq!(assembler.width(), 2 + 4 + 4);

        let matrix = assembler.assemble(&records).unwrap();
        assert_eq!(matrix.features.dim(), (4, 10));
        assert_eq!(matrix.ids, vec![1, 2, 3, 4]);
        assert_eq!(
            matrix.labels,
            vec![Label::Normal, Label::Normal, Label::Anomaly, Label::Normal]
        );
        assert_eq!(matrix.num_anomalies(), 1);

        let first = matrix.features.row(0);
        assert_eq!(first[1], 181.0);
        // tcp is the most frequent protocol, http the most frequent service
        assert_eq!(first[2], 1.0);
        assert_eq!(first[6], 1.0);
        assert_eq!(first.iter().sum::<f64>(), 183.0);
    }

    #[test]
    fn unseen_category_goes_to_unknown_slot() {
        let assembler = FeatureAssembler::fit(&sample_records()).unwrap();
        let matrix = assembler
            .assemble(&[record(9, &[1.0, 1.0], &["sctp", "http"], "normal.")])
            .unwrap();
        let row = matrix.features.row(0);
        assert_eq!(row[5], 1.0); // protocol unknown slot
        assert_eq!(row[2] + row[3] + row[4], 0.0);
    }

    #[test]
    fn inconsistent_widths_are_rejected() {
        let mut records = sample_records();
        records.push(record(5, &[1.0], &["tcp", "http"], "normal."));
        assert!(matches!(
            FeatureAssembler::fit(&records),
            Err(AnomalyError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            FeatureAssembler::fit(&[]),
            Err(AnomalyError::InsufficientSamples { .. })
        ));
    }

    #[test]
    fn split_is_seeded_and_complete() {
        let records: Vec<ConnectionRecord> = (0..20)
            .map(|i| record(i, &[i as f64], &["tcp"], "normal."))
            .collect();
        let (train_a, test_a) = train_test_split(&records, 0.75, 11).unwrap();
        let (train_b, test_b) = train_test_split(&records, 0.75, 11).unwrap();
        assert_eq!(train_a.len(), 15);
        assert_eq!(test_a.len(), 5);
        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);

        let mut ids: Vec<u64> = train_a.iter().chain(&test_a).map(|r| r.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..20).collect::<Vec<u64>>());

        assert!(matches!(
            train_test_split(&records, 1.0, 11),
            Err(AnomalyError::InvalidParameter { name: "train_fraction", .. })
        ));
    }

    #[test]
    fn filter_normal_drops_attacks() {
        let normal = filter_normal(&sample_records());
        assert_eq!(normal.len(), 3);
        assert!(normal.iter().all(|r| r.label() == Label::Normal));
    }
}
