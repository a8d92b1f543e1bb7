// Principal component basis for reconstruction-error scoring

use log::{debug, info};
use ndarray::{s, Array1, Array2, ArrayViewMut1, Axis, Zip};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Instant;

use crate::error::{ensure_width, AnomalyError, Result};
use crate::linalg_backends::{BackendEigh, BackendQR, BackendSVD, LinAlgBackendProvider};
use crate::stages::{Projections, Reconstruction, StandardizedFeatures};

/// Norms below this are treated as a vanishing axis.
const NORMALIZATION_THRESHOLD: f64 = 1e-9;
/// Largest tolerated `|C·Cᵀ - I|` entry for a loaded basis.
const ORTHONORMALITY_TOLERANCE: f64 = 1e-6;

/// How the top-k principal axes are computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum FitStrategy {
    /// Eigendecomposition of the covariance matrix, or of the Gram matrix when
    /// there are more features than samples.
    #[default]
    Exact,
    /// Randomized SVD (Halko, Martinsson, Tropp 2011). Approximate, but never
    /// forms a `d × d` matrix.
    Randomized {
        /// Extra sketch dimensions beyond `k`.
        oversamples: usize,
        /// Subspace power iterations refining the sketch.
        power_iterations: usize,
        /// Seed for the Gaussian test matrix.
        seed: u64,
    },
}

/// Orthonormal principal basis learned once from standardized training data.
///
/// Invariants: `components` is `(k, d)` with orthonormal rows, `1 <= k <= d`,
/// `mean` has length `d`, `explained_variance` has length `k` and is sorted
/// descending.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PcaBasis {
    /// Principal axes as rows.
    /// Shape: (k_components, n_features)
    components: Array2<f64>,
    /// Per-feature mean of the training matrix (≈0 after standardization).
    /// Shape: (n_features)
    mean: Array1<f64>,
    /// Eigenvalues of the training covariance for the kept axes.
    /// Shape: (k_components)
    explained_variance: Array1<f64>,
    /// Trace of the training covariance matrix.
    total_variance: f64,
}

impl PcaBasis {
    /// Fits the top-`k` principal axes of `x`.
    ///
    /// The per-feature mean of `x` is stored and subtracted first. Axes are
    /// ranked by descending eigenvalue (stable on ties), normalized to unit
    /// length and signed so that their largest-magnitude entry is positive,
    /// which makes the result deterministic for a given input.
    ///
    /// # Errors
    /// - `InvalidParameter` if `k == 0` or `k > n_features`, or if the
    ///   randomized strategy is asked for `k > min(n_samples, n_features)`.
    /// - `InsufficientSamples` for fewer than 2 rows.
    /// - `NonFiniteValue` for NaN or infinite entries.
    /// - `Linalg` if a decomposition fails.
    pub fn fit(x: &StandardizedFeatures, k: usize, strategy: FitStrategy) -> Result<Self> {
        let data = x.data();
        let (n_samples, n_features) = data.dim();

        if n_samples < 2 {
            return Err(AnomalyError::InsufficientSamples {
                context: "PCA fit",
                required: 2,
                actual: n_samples,
            });
        }
        if k == 0 || k > n_features {
            return Err(AnomalyError::invalid_parameter(
                "k",
                k,
                format!("must satisfy 1 <= k <= n_features ({})", n_features),
            ));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(AnomalyError::NonFiniteValue {
                context: "PCA training matrix".to_string(),
            });
        }

        let start_time = Instant::now();
        let mean = data
            .mean_axis(Axis(0))
            .ok_or(AnomalyError::InsufficientSamples {
                context: "PCA fit",
                required: 2,
                actual: n_samples,
            })?;
        let centered = data - &mean;
        let total_variance = centered.iter().map(|v| v * v).sum::<f64>() / (n_samples - 1) as f64;

        let (axes, eigenvalues) = match strategy {
            FitStrategy::Exact => {
                // The Gram matrix has at most n-1 useful directions; beyond that fall back.
                let gram_result = if n_features > n_samples && k < n_samples {
                    gram_axes(&centered, k)?
                } else {
                    None
                };
                match gram_result {
                    Some(found) => found,
                    None => covariance_axes(&centered, k)?,
                }
            }
            FitStrategy::Randomized { oversamples, power_iterations, seed } => {
                randomized_axes(&centered, k, oversamples, power_iterations, seed)?
            }
        };

        let mut components = axes;
        for mut row in components.rows_mut() {
            fix_sign(row.view_mut());
        }

        info!(
            "Fitted PCA basis: {} of {} components from {} samples in {:?}.",
            k,
            n_features,
            n_samples,
            start_time.elapsed()
        );
        debug!("Explained variance of kept components: {:?}", eigenvalues);

        Ok(Self {
            components,
            mean,
            explained_variance: eigenvalues,
            total_variance,
        })
    }

    /// Builds a basis from externally computed parts.
    ///
    /// * `components` - `(k, d)` with orthonormal rows.
    /// * `mean` - length `d`.
    /// * `explained_variance` - length `k`, non-negative.
    pub fn from_parts(
        components: Array2<f64>,
        mean: Array1<f64>,
        explained_variance: Array1<f64>,
    ) -> Result<Self> {
        let total_variance = explained_variance.sum();
        let basis = Self {
            components,
            mean,
            explained_variance,
            total_variance,
        };
        basis.validate()?;
        Ok(basis)
    }

    /// Projects every row onto the basis: `proj = C · (v - mean)`.
    ///
    /// # Errors
    /// `DimensionMismatch` if `x` is not `n_features` wide.
    pub fn transform(&self, x: &StandardizedFeatures) -> Result<Projections> {
        ensure_width("PCA transform", self.n_features(), x.num_features())?;

        let mut data = Array2::<f64>::zeros((x.num_samples(), self.n_components()));
        Zip::from(data.rows_mut())
            .and(x.data().rows())
            .par_for_each(|mut projected, sample| {
                let centered = &sample - &self.mean;
                projected.assign(&self.components.dot(&centered));
            });
        Ok(Projections { data })
    }

    /// Maps projections back to feature space: `recon = Cᵀ · p + mean`.
    /// The rows of `C` are orthonormal, so `Cᵀ` is the pseudo-inverse.
    ///
    /// # Errors
    /// `DimensionMismatch` if `p` is not `n_components` wide.
    pub fn reconstruct(&self, p: &Projections) -> Result<Reconstruction> {
        ensure_width("PCA reconstruct", self.n_components(), p.num_components())?;

        let mut data = Array2::<f64>::zeros((p.num_samples(), self.n_features()));
        Zip::from(data.rows_mut())
            .and(p.data().rows())
            .par_for_each(|mut reconstructed, coordinates| {
                reconstructed.assign(&(self.components.t().dot(&coordinates) + &self.mean));
            });
        Ok(Reconstruction { data })
    }

    /// Principal axes as rows. Shape: (k_components, n_features)
    pub fn components(&self) -> &Array2<f64> {
        &self.components
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Covariance eigenvalues of the kept components, largest first.
    pub fn explained_variance(&self) -> &Array1<f64> {
        &self.explained_variance
    }

    /// Share of the total training variance captured by each component.
    pub fn explained_variance_ratio(&self) -> Array1<f64> {
        if self.total_variance <= NORMALIZATION_THRESHOLD {
            return Array1::zeros(self.n_components());
        }
        &self.explained_variance / self.total_variance
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.components.ncols()
    }

    /// Saves the basis with bincode.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref()).map_err(|e| AnomalyError::io(path.as_ref(), e))?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| {
                AnomalyError::Serialization(format!("failed to serialize PCA basis: {}", e))
            })?;
        Ok(())
    }

    /// Loads a basis saved with [`PcaBasis::save`] and checks its internal
    /// consistency.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| AnomalyError::io(path.as_ref(), e))?;
        let mut reader = BufReader::new(file);
        let basis: PcaBasis =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
                .map_err(|e| {
                    AnomalyError::Serialization(format!("failed to deserialize PCA basis: {}", e))
                })?;
        basis.validate()?;
        Ok(basis)
    }

    /// Like [`PcaBasis::load`], but rejects a basis fitted on a different
    /// number of features than `expected_features`.
    pub fn load_for_width<P: AsRef<Path>>(path: P, expected_features: usize) -> Result<Self> {
        let basis = Self::load(path)?;
        ensure_width("loaded PCA basis", expected_features, basis.n_features())?;
        Ok(basis)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let (k, d) = self.components.dim();
        if k == 0 || k > d {
            return Err(AnomalyError::InvalidModel(format!(
                "basis has {} components for {} features; need 1 <= k <= d",
                k, d
            )));
        }
        if self.mean.len() != d {
            return Err(AnomalyError::InvalidModel(format!(
                "mean has length {} but components have {} features",
                self.mean.len(),
                d
            )));
        }
        if self.explained_variance.len() != k {
            return Err(AnomalyError::InvalidModel(format!(
                "explained_variance has length {} but there are {} components",
                self.explained_variance.len(),
                k
            )));
        }
        if self.components.iter().chain(self.mean.iter()).any(|v| !v.is_finite()) {
            return Err(AnomalyError::InvalidModel("basis contains non-finite values".to_string()));
        }
        if self.explained_variance.iter().any(|&v| !v.is_finite() || v < 0.0) {
            return Err(AnomalyError::InvalidModel(
                "explained_variance must be finite and non-negative".to_string(),
            ));
        }
        let gram = self.components.dot(&self.components.t());
        for ((i, j), &value) in gram.indexed_iter() {
            let expected = if i == j { 1.0 } else { 0.0 };
            if (value - expected).abs() > ORTHONORMALITY_TOLERANCE {
                return Err(AnomalyError::InvalidModel(format!(
                    "component rows are not orthonormal (entry ({}, {}) of C·Cᵀ is {})",
                    i, j, value
                )));
            }
        }
        Ok(())
    }
}

/// Eigenpairs sorted by descending eigenvalue. `sort_by` is stable, so equal
/// eigenvalues keep the solver's order.
fn sorted_eigenpairs(
    eigenvalues: &Array1<f64>,
    eigenvectors: &Array2<f64>,
) -> Vec<(f64, Array1<f64>)> {
    let mut eig_pairs: Vec<(f64, Array1<f64>)> = eigenvalues
        .iter()
        .cloned()
        .zip(eigenvectors.columns().into_iter().map(|col| col.to_owned()))
        .collect();
    eig_pairs.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    eig_pairs
}

/// Stacks `axes` as rows of a `(k, d)` matrix.
fn stack_rows(axes: &[Array1<f64>], n_features: usize) -> Array2<f64> {
    let mut components = Array2::<f64>::zeros((axes.len(), n_features));
    for (mut row, axis) in components.rows_mut().into_iter().zip(axes) {
        row.assign(axis);
    }
    components
}

/// Top-k eigenvectors of the `d × d` covariance `XᵀX / (n-1)`.
fn covariance_axes(centered: &Array2<f64>, k: usize) -> Result<(Array2<f64>, Array1<f64>)> {
    let n_samples = centered.nrows();
    let n_features = centered.ncols();
    let mut cov_matrix = centered.t().dot(centered);
    cov_matrix /= (n_samples - 1) as f64;

    let eig = LinAlgBackendProvider::<f64>::new().eigh_upper(&cov_matrix)?;
    let eig_pairs = sorted_eigenpairs(&eig.eigenvalues, &eig.eigenvectors);

    let mut axes = Vec::with_capacity(k);
    let mut eigenvalues = Vec::with_capacity(k);
    for (eig_val, mut eig_vec) in eig_pairs.into_iter().take(k) {
        let norm = eig_vec.dot(&eig_vec).sqrt();
        if norm <= NORMALIZATION_THRESHOLD {
            return Err(AnomalyError::Linalg("eigensolver returned a zero eigenvector".to_string()));
        }
        eig_vec.mapv_inplace(|x| x / norm);
        eigenvalues.push(eig_val.max(0.0));
        axes.push(eig_vec);
    }
    debug!("Covariance path: {}x{} eigendecomposition.", n_features, n_features);
    Ok((stack_rows(&axes, n_features), Array1::from(eigenvalues)))
}

/// Top-k axes via the `n × n` Gram matrix `XXᵀ / (n-1)`, mapped back with
/// `v = Xᵀu / |Xᵀu|`. Returns `None` when one of the top-k directions has no
/// variance, in which case the covariance path must be used.
fn gram_axes(centered: &Array2<f64>, k: usize) -> Result<Option<(Array2<f64>, Array1<f64>)>> {
    let n_samples = centered.nrows();
    let n_features = centered.ncols();
    let mut gram_matrix = centered.dot(&centered.t());
    gram_matrix /= (n_samples - 1) as f64;

    let eig = LinAlgBackendProvider::<f64>::new().eigh_upper(&gram_matrix)?;
    let eig_pairs = sorted_eigenpairs(&eig.eigenvalues, &eig.eigenvectors);

    let mut axes = Vec::with_capacity(k);
    let mut eigenvalues = Vec::with_capacity(k);
    for (eig_val, u_col) in eig_pairs.into_iter().take(k) {
        let mut axis = centered.t().dot(&u_col);
        let norm = axis.dot(&axis).sqrt();
        if eig_val <= NORMALIZATION_THRESHOLD || norm <= NORMALIZATION_THRESHOLD {
            debug!(
                "Gram path hit a null direction in the top {} components; using covariance path.",
                k
            );
            return Ok(None);
        }
        axis.mapv_inplace(|x| x / norm);
        eigenvalues.push(eig_val);
        axes.push(axis);
    }
    debug!("Gram path: {}x{} eigendecomposition.", n_samples, n_samples);
    Ok(Some((stack_rows(&axes, n_features), Array1::from(eigenvalues))))
}

/// Top-k axes from a randomized SVD of the centered matrix `A` (n × d).
///
/// - `d <= n`: sketch `Y = AΩ`, orthonormalize, project `B = QᵀA`, axes are
///   the leading rows of `Vᵀ` from the SVD of `B`.
/// - `d > n`: sketch `Y = AᵀΩ`, orthonormalize, project `B = (AQ)ᵀ`, axes are
///   the leading columns of `Q·U_B`.
fn randomized_axes(
    centered: &Array2<f64>,
    k: usize,
    oversamples: usize,
    power_iterations: usize,
    seed: u64,
) -> Result<(Array2<f64>, Array1<f64>)> {
    let (n_samples, n_features) = centered.dim();
    let max_possible_rank = n_samples.min(n_features);
    if k > max_possible_rank {
        return Err(AnomalyError::invalid_parameter(
            "k",
            k,
            format!(
                "randomized fit needs k <= min(n_samples, n_features) = {}",
                max_possible_rank
            ),
        ));
    }
    if oversamples == 0 {
        return Err(AnomalyError::invalid_parameter(
            "oversamples",
            oversamples,
            "randomized fit needs at least one oversample",
        ));
    }
    let l_sketch = (k + oversamples).min(max_possible_rank).max(k);
    let backend = LinAlgBackendProvider::<f64>::new();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| AnomalyError::Linalg(format!("failed to create normal distribution: {}", e)))?;

    let (axes, singular_values) = if n_features <= n_samples {
        let omega = Array2::from_shape_fn((n_features, l_sketch), |_| rng.sample(normal));
        let mut q_basis = backend.qr_q_factor(&centered.dot(&omega))?; // n x l
        for _ in 0..power_iterations {
            let w = backend.qr_q_factor(&centered.t().dot(&q_basis))?; // d x l
            q_basis = backend.qr_q_factor(&centered.dot(&w))?; // n x l
        }
        let b_projected = q_basis.t().dot(centered); // l x d
        let svd = backend.svd_into(b_projected, false, true)?;
        let vt = svd
            .vt
            .ok_or_else(|| AnomalyError::Linalg("SVD did not return Vᵀ".to_string()))?;
        (vt.slice(s![..k, ..]).to_owned(), svd.s)
    } else {
        let omega = Array2::from_shape_fn((n_samples, l_sketch), |_| rng.sample(normal));
        let mut q_basis = backend.qr_q_factor(&centered.t().dot(&omega))?; // d x l
        for _ in 0..power_iterations {
            let w = backend.qr_q_factor(&centered.dot(&q_basis))?; // n x l
            q_basis = backend.qr_q_factor(&centered.t().dot(&w))?; // d x l
        }
        let b_projected = centered.dot(&q_basis).t().to_owned(); // l x n
        let svd = backend.svd_into(b_projected, true, false)?;
        let u_b = svd
            .u
            .ok_or_else(|| AnomalyError::Linalg("SVD did not return U".to_string()))?;
        let rotation = q_basis.dot(&u_b.slice(s![.., ..k])); // d x k
        (rotation.t().to_owned(), svd.s)
    };

    let mut components = axes;
    for mut row in components.rows_mut() {
        let norm = row.dot(&row).sqrt();
        if norm <= NORMALIZATION_THRESHOLD {
            return Err(AnomalyError::Linalg("randomized sketch produced a zero axis".to_string()));
        }
        row.mapv_inplace(|v| v / norm);
    }
    let eigenvalues = singular_values
        .slice(s![..k])
        .mapv(|sv| sv.powi(2) / (n_samples - 1) as f64);
    debug!(
        "Randomized path: sketch of {} columns, {} power iterations.",
        l_sketch, power_iterations
    );
    Ok((components, eigenvalues))
}

/// Flips `axis` so its largest-magnitude entry is positive.
fn fix_sign(mut axis: ArrayViewMut1<f64>) {
    let pivot = axis
        .iter()
        .cloned()
        .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
    if pivot < 0.0 {
        axis.mapv_inplace(|v| -v);
    }
}

