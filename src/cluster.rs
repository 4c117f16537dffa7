//! Customer segmentation with K-Means over standardized behavior features.

use linfa::prelude::*;
use linfa::Dataset;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use linfa_preprocessing::linear_scaling::LinearScaler;
use linfa_tsne::TSneParams;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use tracing::warn;

use crate::features::UserFeatures;

/// Perplexity of the t-SNE projection used for the segment plot.
pub const TSNE_PERPLEXITY: f64 = 30.0;

/// Candidate cluster counts explored by the k-comparison report.
pub const K_CANDIDATES: [usize; 4] = [3, 4, 5, 6];

/// K-Means hyperparameters. Defaults mirror the reference analysis:
/// 10 restarts, 300 iterations, 1e-4 tolerance, seed 42.
#[derive(Debug, Clone)]
pub struct KMeansOptions {
    pub max_iters: u64,
    pub tolerance: f64,
    pub restarts: usize,
    pub seed: u64,
}

impl Default for KMeansOptions {
    fn default() -> Self {
        Self {
            max_iters: 300,
            tolerance: 1e-4,
            restarts: 10,
            seed: 42,
        }
    }
}

/// Segmentation result: the input rows, one label per row, and the fitted
/// model's diagnostics. Labels are integers in `[0, k)`.
#[derive(Debug)]
pub struct Segmentation {
    pub users: Vec<UserFeatures>,
    pub labels: Vec<usize>,
    /// Centroids in standardized feature space, shape `(k, 7)`.
    pub centroids: Array2<f64>,
    /// Standardized feature matrix the model was fitted on, shape `(n, 7)`.
    pub scaled: Array2<f64>,
    /// Within-cluster sum of squares.
    pub inertia: f64,
    pub k: usize,
}

/// Label distribution for one candidate k.
#[derive(Debug)]
pub struct KComparison {
    pub k: usize,
    pub sizes: Vec<usize>,
    pub inertia: f64,
}

/// Partition customers into `k` groups.
///
/// The seven feature columns are standardized (zero mean, unit variance,
/// fitted on the given data) before clustering. With a fixed seed the
/// assignment is identical across runs on identical input.
pub fn segment(
    users: Vec<UserFeatures>,
    k: usize,
    opts: &KMeansOptions,
) -> crate::Result<Segmentation> {
    if !(2..=8).contains(&k) {
        anyhow::bail!("cluster count must be between 2 and 8, got {k}");
    }
    if users.len() < k {
        anyhow::bail!(
            "number of customers ({}) must be at least the cluster count ({k})",
            users.len()
        );
    }

    let scaled = standardize(feature_matrix(&users))?;
    let (labels, centroids) = fit_kmeans(&scaled, k, opts)?;
    let inertia = compute_inertia(&scaled, &labels, &centroids);

    Ok(Segmentation {
        users,
        labels: labels.to_vec(),
        centroids,
        scaled,
        inertia,
        k,
    })
}

/// Fit K-Means once per candidate k and report the label distributions,
/// for choosing k before the final segmentation.
pub fn compare_cluster_counts(
    users: &[UserFeatures],
    candidates: &[usize],
    opts: &KMeansOptions,
) -> crate::Result<Vec<KComparison>> {
    let scaled = standardize(feature_matrix(users))?;

    let mut comparisons = Vec::with_capacity(candidates.len());
    for &k in candidates {
        if users.len() < k {
            warn!(k, customers = users.len(), "skipping k larger than dataset");
            continue;
        }
        let (labels, centroids) = fit_kmeans(&scaled, k, opts)?;
        let mut sizes = vec![0usize; k];
        for &label in labels.iter() {
            sizes[label] += 1;
        }
        let inertia = compute_inertia(&scaled, &labels, &centroids);
        comparisons.push(KComparison { k, sizes, inertia });
    }
    Ok(comparisons)
}

impl Segmentation {
    /// Number of customers per cluster.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }

    /// Mean of each raw feature column, grouped by cluster label.
    /// Rows are `(label, [means in FEATURE_COLUMNS order])`.
    pub fn cluster_feature_means(&self) -> Vec<(usize, [f64; 7])> {
        let mut sums = vec![[0.0f64; 7]; self.k];
        let mut counts = vec![0usize; self.k];
        for (user, &label) in self.users.iter().zip(&self.labels) {
            let row = user.feature_row();
            for (slot, value) in sums[label].iter_mut().zip(row) {
                *slot += value;
            }
            counts[label] += 1;
        }

        sums.into_iter()
            .zip(counts)
            .enumerate()
            .map(|(label, (sum, count))| {
                let mut mean = sum;
                if count > 0 {
                    for value in &mut mean {
                        *value /= count as f64;
                    }
                }
                (label, mean)
            })
            .collect()
    }

    /// Mean silhouette coefficient over a sample of points, in `[-1, 1]`.
    /// Sampled because the full computation is quadratic in the row count.
    pub fn silhouette_sample(&self, sample_size: usize) -> f64 {
        let n_samples = self.scaled.nrows().min(sample_size);
        if n_samples < 2 {
            return 0.0;
        }

        let mut silhouette_sum = 0.0;
        for i in 0..n_samples {
            let point = self.scaled.row(i);
            let own_label = self.labels[i];

            let mut same_cluster = Vec::new();
            let mut other_clusters: Vec<Vec<f64>> = vec![Vec::new(); self.k];
            for j in 0..n_samples {
                if i == j {
                    continue;
                }
                let distance = euclidean_distance(&point, &self.scaled.row(j));
                if self.labels[j] == own_label {
                    same_cluster.push(distance);
                } else {
                    other_clusters[self.labels[j]].push(distance);
                }
            }

            let a_i = if same_cluster.is_empty() {
                0.0
            } else {
                same_cluster.iter().sum::<f64>() / same_cluster.len() as f64
            };
            let b_i = other_clusters
                .iter()
                .filter(|distances| !distances.is_empty())
                .map(|distances| distances.iter().sum::<f64>() / distances.len() as f64)
                .fold(f64::INFINITY, f64::min);

            silhouette_sum += if b_i.is_infinite() || (a_i == 0.0 && b_i == 0.0) {
                0.0
            } else {
                (b_i - a_i) / a_i.max(b_i)
            };
        }

        silhouette_sum / n_samples as f64
    }

    /// Project the standardized features to 2-D with t-SNE for plotting.
    ///
    /// The axes carry no semantic meaning; the projection exists only to
    /// visualize cluster separation. Returns `None` when the dataset is too
    /// small for the configured perplexity (t-SNE needs
    /// `n >= 3 * perplexity + 1` rows).
    pub fn embed_2d(&self, perplexity: f64, seed: u64) -> crate::Result<Option<Array2<f64>>> {
        let n = self.scaled.nrows();
        let required = (3.0 * perplexity).ceil() as usize + 1;
        if n < required {
            warn!(
                customers = n,
                required, "too few customers for t-SNE projection, skipping segment plot"
            );
            return Ok(None);
        }

        let dataset = Dataset::new(self.scaled.clone(), Array1::<usize>::zeros(n));
        let embedded = TSneParams::embedding_size_with_rng(2, Xoshiro256Plus::seed_from_u64(seed))
            .perplexity(perplexity)
            .approx_threshold(0.5)
            .transform(dataset)?;
        Ok(Some(embedded.records().clone()))
    }
}

/// Assemble the `(n, 7)` raw feature matrix in [`FEATURE_COLUMNS`] order.
///
/// [`FEATURE_COLUMNS`]: crate::features::FEATURE_COLUMNS
fn feature_matrix(users: &[UserFeatures]) -> Array2<f64> {
    let mut data = Vec::with_capacity(users.len() * 7);
    for user in users {
        data.extend_from_slice(&user.feature_row());
    }
    Array2::from_shape_vec((users.len(), 7), data).expect("row-major feature data")
}

/// Standardize columns to zero mean and unit variance, fitted on the data.
fn standardize(features: Array2<f64>) -> crate::Result<Array2<f64>> {
    let n = features.nrows();
    let dataset = Dataset::new(features, Array1::<usize>::zeros(n));
    let scaler = LinearScaler::standard().fit(&dataset)?;
    let scaled = scaler.transform(dataset);
    Ok(scaled.records().clone())
}

fn fit_kmeans(
    scaled: &Array2<f64>,
    k: usize,
    opts: &KMeansOptions,
) -> crate::Result<(Array1<usize>, Array2<f64>)> {
    let dataset = Dataset::new(scaled.clone(), Array1::<usize>::zeros(scaled.nrows()));
    let rng = Xoshiro256Plus::seed_from_u64(opts.seed);
    let model = KMeans::params_with(k, rng, L2Dist)
        .n_runs(opts.restarts)
        .max_n_iterations(opts.max_iters)
        .tolerance(opts.tolerance)
        .fit(&dataset)?;

    let labels = model.predict(&dataset);
    let centroids = model.centroids().clone();
    Ok((labels, centroids))
}

/// Within-cluster sum of squares over standardized features.
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    let mut inertia = 0.0;
    for (i, &cluster) in labels.iter().enumerate() {
        let point = features.row(i);
        let centroid = centroids.row(cluster);
        inertia += point
            .iter()
            .zip(centroid.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>();
    }
    inertia
}

fn euclidean_distance(a: &ndarray::ArrayView1<f64>, b: &ndarray::ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}
