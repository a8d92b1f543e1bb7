//! Fits a detector on synthetic KDD-style connection records and reports the
//! ROC-AUC on a held-out split.
//!
//! ```bash
//! RUST_LOG=info cargo run --release --example kdd_demo
//! ```

use pca_anomaly::{
    filter_normal, train_test_split, AnomalyDetector, ConnectionRecord, DetectorConfig,
    FeatureAssembler, FitStrategy, FittedDetector,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::Normal;

const N_RECORDS: usize = 20_000;
const ATTACK_RATE: f64 = 0.2;
const SEED: u64 = 42;

/// duration, src_bytes, dst_bytes, count, srv_count, serror_rate, same_srv_rate
fn synthesize(rng: &mut ChaCha8Rng, jitter: Normal<f64>, id: u64) -> ConnectionRecord {
    let noise = |rng: &mut ChaCha8Rng, scale: f64| scale * rng.sample(jitter);

    let draw = rng.gen_range(0.0..1.0);
    let (numeric, categorical, label) = if draw >= ATTACK_RATE {
        let activity: f64 = rng.gen_range(0.0..1.0);
        let service = if activity < 0.7 { "http" } else { "smtp" };
        (
            vec![
                noise(rng, 0.5).abs(),
                (5.0 + 1.5 * activity + noise(rng, 0.1)).max(0.0),
                (7.0 + 2.0 * activity + noise(rng, 0.1)).max(0.0),
                (2.0 + 8.0 * activity + noise(rng, 0.5)).max(0.0),
                (2.0 + 8.0 * activity + noise(rng, 0.5)).max(0.0),
                0.0,
                1.0,
            ],
            ["tcp", service, "SF"],
            "normal.",
        )
    } else if draw < ATTACK_RATE / 2.0 {
        (
            vec![0.0, 6.94, 0.0, 511.0 + noise(rng, 2.0), 511.0 + noise(rng, 2.0), 0.0, 1.0],
            ["icmp", "ecr_i", "SF"],
            "smurf.",
        )
    } else {
        (
            vec![0.0, 0.0, 0.0, 120.0 + noise(rng, 20.0), 8.0 + noise(rng, 2.0), 1.0, 0.05],
            ["tcp", "private", "S0"],
            "neptune.",
        )
    };

    ConnectionRecord {
        id,
        numeric,
        categorical: categorical.iter().map(|s| s.to_string()).collect(),
        original_label: label.to_string(),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let jitter = Normal::new(0.0, 1.0)?;
    let records: Vec<ConnectionRecord> = (0..N_RECORDS as u64)
        .map(|id| synthesize(&mut rng, jitter, id))
        .collect();
    let (train, test) = train_test_split(&records, 0.8, SEED)?;

    let assembler = FeatureAssembler::fit(&train)?;
    let train_normal = assembler.assemble(&filter_normal(&train))?;
    let test_matrix = assembler.assemble(&test)?;
    log::info!(
        "Training on {} normal records; testing on {} records ({} attacks), width {}.",
        train_normal.labels.len(),
        test_matrix.labels.len(),
        test_matrix.num_anomalies(),
        assembler.width()
    );

    for strategy in [
        FitStrategy::Exact,
        FitStrategy::Randomized { oversamples: 10, power_iterations: 2, seed: SEED },
    ] {
        let config = DetectorConfig {
            n_components: 3,
            fit_strategy: strategy,
            ..DetectorConfig::default()
        };
        let detector = AnomalyDetector::new(config)?.fit(train_normal.features.view())?;
        let evaluation = detector.evaluate(test_matrix.features.view(), &test_matrix.labels)?;
        log::info!("{:?}: ROC-AUC {:.4}", strategy, evaluation.auc);

        let model_path = std::env::temp_dir().join("pca_anomaly_kdd_demo.bin");
        detector.save(&model_path)?;
        let reloaded = FittedDetector::load_for_width(&model_path, assembler.width())?;
        let reloaded_auc = reloaded.evaluate(test_matrix.features.view(), &test_matrix.labels)?.auc;
        log::info!("Reloaded detector ROC-AUC {:.4}", reloaded_auc);
        std::fs::remove_file(&model_path)?;
    }
    Ok(())
}
