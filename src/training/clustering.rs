//! Clustering: K-Means, DBSCAN, agglomerative and Gaussian mixtures
//!
//! Unsupervised; takes X only. Used by the clustering analysis, which reports
//! results but never stores a servable model.

use crate::error::{Result, StudioError};
use ndarray::{Array1, Array2, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════
//  K-Means Clustering
// ═══════════════════════════════════════════════════════════════════════════

/// K-Means clustering with k-means++ initialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeans {
    pub n_clusters: usize,
    pub max_iter: usize,
    pub tol: f64,
    pub random_state: u64,
    /// Fitted cluster centroids (n_clusters × n_features)
    centroids: Option<Array2<f64>>,
    /// Cluster index of every training row
    labels: Option<Vec<usize>>,
    /// Sum of squared distances to nearest centroid
    inertia: Option<f64>,
}

impl Default for KMeans {
    fn default() -> Self {
        Self::new(3)
    }
}

fn euclidean_sq(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

impl KMeans {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iter: 300,
            tol: 1e-4,
            random_state: 42,
            centroids: None,
            labels: None,
            inertia: None,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// K-means++ initialization: pick centroids spread apart
    fn kmeans_pp_init(x: &Array2<f64>, k: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
        let n_samples = x.nrows();
        let mut centroids = Array2::zeros((k, x.ncols()));

        let first = rng.gen_range(0..n_samples);
        centroids.row_mut(0).assign(&x.row(first));

        for c in 1..k {
            let dists: Vec<f64> = (0..n_samples)
                .map(|i| {
                    (0..c)
                        .map(|j| euclidean_sq(x.row(i), centroids.row(j)))
                        .fold(f64::MAX, f64::min)
                })
                .collect();

            // Weighted random selection proportional to D²
            let total: f64 = dists.iter().sum();
            if total <= 0.0 {
                let idx = rng.gen_range(0..n_samples);
                centroids.row_mut(c).assign(&x.row(idx));
                continue;
            }

            let r = rng.gen::<f64>() * total;
            let mut cumulative = 0.0;
            let mut chosen = n_samples - 1;
            for (i, &d) in dists.iter().enumerate() {
                cumulative += d;
                if cumulative >= r {
                    chosen = i;
                    break;
                }
            }
            centroids.row_mut(c).assign(&x.row(chosen));
        }

        centroids
    }

    fn assign(x: &Array2<f64>, centroids: &Array2<f64>) -> Vec<usize> {
        (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let mut best_c = 0;
                let mut best_dist = f64::MAX;
                for c in 0..centroids.nrows() {
                    let d = euclidean_sq(x.row(i), centroids.row(c));
                    if d < best_dist {
                        best_dist = d;
                        best_c = c;
                    }
                }
                best_c
            })
            .collect()
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if self.n_clusters == 0 {
            return Err(StudioError::InvalidParameter {
                name: "n_clusters".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if n_samples < self.n_clusters {
            return Err(StudioError::TrainingError(format!(
                "n_samples ({}) < n_clusters ({})",
                n_samples, self.n_clusters
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut centroids = Self::kmeans_pp_init(x, self.n_clusters, &mut rng);
        let mut labels = vec![usize::MAX; n_samples];

        for _ in 0..self.max_iter {
            let new_labels = Self::assign(x, &centroids);
            let changed = new_labels.iter().zip(&labels).filter(|(a, b)| a != b).count();
            labels = new_labels;

            let mut new_centroids = Array2::<f64>::zeros(centroids.dim());
            let mut counts = vec![0usize; self.n_clusters];
            for (i, &c) in labels.iter().enumerate() {
                counts[c] += 1;
                let mut row = new_centroids.row_mut(c);
                row += &x.row(i);
            }
            for c in 0..self.n_clusters {
                if counts[c] > 0 {
                    new_centroids.row_mut(c).mapv_inplace(|v| v / counts[c] as f64);
                } else {
                    // Empty cluster: reseed from a random row
                    let idx = rng.gen_range(0..n_samples);
                    new_centroids.row_mut(c).assign(&x.row(idx));
                }
            }

            let shift: f64 = centroids
                .iter()
                .zip(new_centroids.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
                .sqrt();
            centroids = new_centroids;

            if changed == 0 || shift < self.tol {
                break;
            }
        }

        let labels = Self::assign(x, &centroids);
        let inertia: f64 = labels
            .iter()
            .enumerate()
            .map(|(i, &c)| euclidean_sq(x.row(i), centroids.row(c)))
            .sum();

        self.centroids = Some(centroids);
        self.labels = Some(labels);
        self.inertia = Some(inertia);
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let centroids = self.centroids.as_ref().ok_or(StudioError::ModelNotFitted)?;
        Ok(Self::assign(x, centroids).into_iter().map(|c| c as f64).collect())
    }

    pub fn centroids(&self) -> Option<&Array2<f64>> {
        self.centroids.as_ref()
    }

    pub fn labels(&self) -> Option<&[usize]> {
        self.labels.as_deref()
    }

    pub fn inertia(&self) -> Option<f64> {
        self.inertia
    }

    /// Number of training rows per cluster
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.n_clusters];
        for &c in self.labels.iter().flatten() {
            sizes[c] += 1;
        }
        sizes
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  DBSCAN Clustering
// ═══════════════════════════════════════════════════════════════════════════

/// DBSCAN (Density-Based Spatial Clustering of Applications with Noise)
///
/// Points are classified as core, border, or noise:
/// - Core: has ≥ min_samples neighbors within eps radius, itself included
/// - Border: within eps of a core point but not core itself
/// - Noise: neither core nor border (label `None`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DBSCAN {
    /// Maximum distance between neighbors
    pub eps: f64,
    /// Minimum points to form a dense region
    pub min_samples: usize,
    labels: Option<Vec<Option<usize>>>,
    n_clusters_found: usize,
}

impl Default for DBSCAN {
    fn default() -> Self {
        Self::new(0.5, 5)
    }
}

impl DBSCAN {
    pub fn new(eps: f64, min_samples: usize) -> Self {
        Self {
            eps,
            min_samples,
            labels: None,
            n_clusters_found: 0,
        }
    }

    /// Find all neighbors within eps distance
    fn region_query(x: &Array2<f64>, point_idx: usize, eps_sq: f64) -> Vec<usize> {
        let row = x.row(point_idx);
        (0..x.nrows())
            .filter(|&i| euclidean_sq(row, x.row(i)) <= eps_sq)
            .collect()
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        if !(self.eps > 0.0) {
            return Err(StudioError::InvalidParameter {
                name: "eps".to_string(),
                value: self.eps.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.min_samples == 0 {
            return Err(StudioError::InvalidParameter {
                name: "min_samples".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let n_samples = x.nrows();
        let eps_sq = self.eps * self.eps;
        let neighbors: Vec<Vec<usize>> = (0..n_samples)
            .into_par_iter()
            .map(|i| Self::region_query(x, i, eps_sq))
            .collect();
        let is_core: Vec<bool> = neighbors.iter().map(|n| n.len() >= self.min_samples).collect();

        let mut labels: Vec<Option<usize>> = vec![None; n_samples];
        let mut cluster_id = 0;

        for i in 0..n_samples {
            if labels[i].is_some() || !is_core[i] {
                continue;
            }

            // breadth-first expansion from core point i
            labels[i] = Some(cluster_id);
            let mut queue: Vec<usize> = neighbors[i].clone();
            let mut head = 0;
            while head < queue.len() {
                let q = queue[head];
                head += 1;
                if labels[q].is_none() {
                    labels[q] = Some(cluster_id);
                }
                if !is_core[q] {
                    continue;
                }
                for &neighbor in &neighbors[q] {
                    if labels[neighbor].is_none() {
                        labels[neighbor] = Some(cluster_id);
                        queue.push(neighbor);
                    }
                }
            }
            cluster_id += 1;
        }

        self.labels = Some(labels);
        self.n_clusters_found = cluster_id;
        Ok(self)
    }

    /// Cluster of every training row; `None` marks noise
    pub fn labels(&self) -> Option<&[Option<usize>]> {
        self.labels.as_deref()
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters_found
    }

    pub fn n_noise(&self) -> usize {
        self.labels.iter().flatten().filter(|l| l.is_none()).count()
    }

    /// Number of training rows per cluster, noise excluded
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.n_clusters_found];
        for c in self.labels.iter().flatten().flatten() {
            sizes[*c] += 1;
        }
        sizes
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Agglomerative Clustering
// ═══════════════════════════════════════════════════════════════════════════

/// Inter-cluster distance used when merging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    #[default]
    Ward,
    Complete,
    Average,
    Single,
}

impl Linkage {
    /// Lance-Williams update: distance from cluster k to the union of i and j
    fn merged_distance(&self, d_ki: f64, d_kj: f64, d_ij: f64, n_i: usize, n_j: usize, n_k: usize) -> f64 {
        let (n_i, n_j, n_k) = (n_i as f64, n_j as f64, n_k as f64);
        match self {
            Linkage::Single => d_ki.min(d_kj),
            Linkage::Complete => d_ki.max(d_kj),
            Linkage::Average => (n_i * d_ki + n_j * d_kj) / (n_i + n_j),
            Linkage::Ward => {
                let sq = ((n_i + n_k) * d_ki * d_ki + (n_j + n_k) * d_kj * d_kj - n_k * d_ij * d_ij)
                    / (n_i + n_j + n_k);
                sq.max(0.0).sqrt()
            }
        }
    }
}

/// Bottom-up hierarchical clustering cut at `n_clusters`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgglomerativeClustering {
    pub n_clusters: usize,
    pub linkage: Linkage,
    labels: Option<Vec<usize>>,
}

impl AgglomerativeClustering {
    /// Rows above this make the quadratic distance matrix impractical
    pub const MAX_SAMPLES: usize = 5_000;

    pub fn new(n_clusters: usize, linkage: Linkage) -> Self {
        Self {
            n_clusters,
            linkage,
            labels: None,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        let n = x.nrows();
        if self.n_clusters == 0 || self.n_clusters > n {
            return Err(StudioError::InvalidParameter {
                name: "n_clusters".to_string(),
                value: self.n_clusters.to_string(),
                reason: format!("must be between 1 and the number of samples ({})", n),
            });
        }
        if n > Self::MAX_SAMPLES {
            return Err(StudioError::DataError(format!(
                "Hierarchical clustering supports at most {} rows, got {}",
                Self::MAX_SAMPLES,
                n
            )));
        }

        let mut dist: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| (0..n).map(|j| euclidean_sq(x.row(i), x.row(j)).sqrt()).collect())
            .collect();
        let mut members: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
        let mut active: Vec<usize> = (0..n).collect();

        while active.len() > self.n_clusters {
            let mut best = (0, 1, f64::INFINITY);
            for (a, &i) in active.iter().enumerate() {
                for &j in &active[a + 1..] {
                    if dist[i][j] < best.2 {
                        best = (i, j, dist[i][j]);
                    }
                }
            }
            let (i, j, d_ij) = best;
            let (n_i, n_j) = (members[i].len(), members[j].len());

            for &k in &active {
                if k == i || k == j {
                    continue;
                }
                let d = self
                    .linkage
                    .merged_distance(dist[k][i], dist[k][j], d_ij, n_i, n_j, members[k].len());
                dist[i][k] = d;
                dist[k][i] = d;
            }
            let absorbed = std::mem::take(&mut members[j]);
            members[i].extend(absorbed);
            active.retain(|&c| c != j);
        }

        // clusters numbered by their smallest row so labels are stable
        active.sort_by_key(|&c| members[c].iter().copied().min().unwrap_or(usize::MAX));
        let mut labels = vec![0usize; n];
        for (label, &c) in active.iter().enumerate() {
            for &row in &members[c] {
                labels[row] = label;
            }
        }
        self.labels = Some(labels);
        Ok(self)
    }

    pub fn labels(&self) -> Option<&[usize]> {
        self.labels.as_deref()
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.n_clusters];
        for &c in self.labels.iter().flatten() {
            sizes[c] += 1;
        }
        sizes
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Gaussian Mixture
// ═══════════════════════════════════════════════════════════════════════════

/// Gaussian mixture with diagonal covariances, fitted by EM from a K-Means start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianMixture {
    pub n_components: usize,
    pub max_iter: usize,
    pub tol: f64,
    /// Floor added to every variance
    pub reg_covar: f64,
    pub random_state: u64,
    weights: Option<Array1<f64>>,
    means: Option<Array2<f64>>,
    variances: Option<Array2<f64>>,
    log_likelihood: Option<f64>,
    n_iter: usize,
}

impl GaussianMixture {
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            max_iter: 100,
            tol: 1e-3,
            reg_covar: 1e-6,
            random_state: 42,
            weights: None,
            means: None,
            variances: None,
            log_likelihood: None,
            n_iter: 0,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter.max(1);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// ln(w_k) + ln N(x_i | μ_k, diag σ²_k), shape (n_samples, n_components)
    fn weighted_log_density(
        x: &Array2<f64>,
        weights: &Array1<f64>,
        means: &Array2<f64>,
        variances: &Array2<f64>,
    ) -> Array2<f64> {
        let ln_2pi = (2.0 * std::f64::consts::PI).ln();
        let mut out = Array2::<f64>::zeros((x.nrows(), weights.len()));
        for k in 0..weights.len() {
            let mu = means.row(k);
            let var = variances.row(k);
            let norm: f64 = var.iter().map(|v| ln_2pi + v.ln()).sum::<f64>();
            for (i, row) in x.rows().into_iter().enumerate() {
                let quad: f64 = row
                    .iter()
                    .zip(mu.iter())
                    .zip(var.iter())
                    .map(|((xi, m), v)| (xi - m).powi(2) / v)
                    .sum();
                out[[i, k]] = weights[k].ln() - 0.5 * (norm + quad);
            }
        }
        out
    }

    /// Normalize rows in log space into responsibilities; returns the total log-likelihood
    fn responsibilities(log_density: &mut Array2<f64>) -> f64 {
        let mut total = 0.0;
        for mut row in log_density.rows_mut() {
            let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let lse = max + row.iter().map(|v| (v - max).exp()).sum::<f64>().ln();
            total += lse;
            row.mapv_inplace(|v| (v - lse).exp());
        }
        total
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        let (n, p) = x.dim();
        let k = self.n_components;
        let mut kmeans = KMeans::new(k).with_random_state(self.random_state);
        kmeans.fit(x)?;
        let labels = kmeans.labels().ok_or(StudioError::ModelNotFitted)?;

        let mut resp = Array2::<f64>::zeros((n, k));
        for (i, &c) in labels.iter().enumerate() {
            resp[[i, c]] = 1.0;
        }

        let mut weights = Array1::<f64>::zeros(k);
        let mut means = Array2::<f64>::zeros((k, p));
        let mut variances = Array2::<f64>::zeros((k, p));
        let mut previous = f64::NEG_INFINITY;
        let mut log_likelihood = f64::NEG_INFINITY;
        self.n_iter = 0;

        for _ in 0..self.max_iter {
            // M step
            for c in 0..k {
                let r = resp.column(c);
                let nk = r.sum() + 10.0 * f64::EPSILON;
                weights[c] = nk / n as f64;
                let mean = r.dot(x) / nk;
                for j in 0..p {
                    let var = r
                        .iter()
                        .zip(x.column(j).iter())
                        .map(|(ri, xi)| ri * (xi - mean[j]).powi(2))
                        .sum::<f64>()
                        / nk;
                    variances[[c, j]] = var + self.reg_covar;
                }
                means.row_mut(c).assign(&mean);
            }

            // E step
            let mut log_density = Self::weighted_log_density(x, &weights, &means, &variances);
            log_likelihood = Self::responsibilities(&mut log_density);
            resp = log_density;
            self.n_iter += 1;

            if (log_likelihood - previous).abs() < self.tol * n as f64 {
                break;
            }
            previous = log_likelihood;
        }

        self.weights = Some(weights);
        self.means = Some(means);
        self.variances = Some(variances);
        self.log_likelihood = Some(log_likelihood);
        Ok(self)
    }

    /// Posterior component probabilities, shape (n_samples, n_components)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (Some(weights), Some(means), Some(variances)) = (&self.weights, &self.means, &self.variances) else {
            return Err(StudioError::ModelNotFitted);
        };
        if x.ncols() != means.ncols() {
            return Err(StudioError::ShapeError {
                expected: format!("{} features", means.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }
        let mut log_density = Self::weighted_log_density(x, weights, means, variances);
        Self::responsibilities(&mut log_density);
        Ok(log_density)
    }

    /// Most probable component of each row
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc })
                    .0
            })
            .collect())
    }

    pub fn means(&self) -> Option<&Array2<f64>> {
        self.means.as_ref()
    }

    pub fn weights(&self) -> Option<&Array1<f64>> {
        self.weights.as_ref()
    }

    /// Total log-likelihood of the training rows
    pub fn log_likelihood(&self) -> Option<f64> {
        self.log_likelihood
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Free parameters: means, diagonal variances and k − 1 weights
    fn n_parameters(&self) -> usize {
        let p = self.means.as_ref().map_or(0, |m| m.ncols());
        2 * self.n_components * p + self.n_components.saturating_sub(1)
    }

    pub fn aic(&self) -> Option<f64> {
        self.log_likelihood.map(|ll| -2.0 * ll + 2.0 * self.n_parameters() as f64)
    }

    pub fn bic(&self, n_samples: usize) -> Option<f64> {
        self.log_likelihood
            .map(|ll| -2.0 * ll + self.n_parameters() as f64 * (n_samples.max(1) as f64).ln())
    }
}

/// Mean silhouette coefficient; `None` with fewer than two clusters
pub fn silhouette_score(x: &Array2<f64>, labels: &[usize]) -> Option<f64> {
    let n = x.nrows();
    let k = labels.iter().copied().max().map(|m| m + 1).unwrap_or(0);
    if k < 2 || n < 2 {
        return None;
    }

    let scores: Vec<f64> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut sums = vec![0.0; k];
            let mut counts = vec![0usize; k];
            for j in 0..n {
                if i != j {
                    sums[labels[j]] += euclidean_sq(x.row(i), x.row(j)).sqrt();
                    counts[labels[j]] += 1;
                }
            }
            let own = labels[i];
            if counts[own] == 0 {
                return 0.0;
            }
            let a = sums[own] / counts[own] as f64;
            let b = (0..k)
                .filter(|&c| c != own && counts[c] > 0)
                .map(|c| sums[c] / counts[c] as f64)
                .fold(f64::MAX, f64::min);
            if b == f64::MAX {
                return 0.0;
            }
            let denom = a.max(b);
            if denom > 0.0 {
                (b - a) / denom
            } else {
                0.0
            }
        })
        .collect();

    Some(scores.iter().sum::<f64>() / n as f64)
}

/// Per-cluster centroids of the labelled rows; empty clusters stay at zero
fn label_centroids(x: &Array2<f64>, labels: &[usize], k: usize) -> (Array2<f64>, Vec<usize>) {
    let mut centroids = Array2::<f64>::zeros((k, x.ncols()));
    let mut counts = vec![0usize; k];
    for (i, &c) in labels.iter().enumerate() {
        counts[c] += 1;
        let mut row = centroids.row_mut(c);
        row += &x.row(i);
    }
    for c in 0..k {
        if counts[c] > 0 {
            centroids.row_mut(c).mapv_inplace(|v| v / counts[c] as f64);
        }
    }
    (centroids, counts)
}

/// Davies-Bouldin index (lower is better); `None` with fewer than two clusters
pub fn davies_bouldin_score(x: &Array2<f64>, labels: &[usize]) -> Option<f64> {
    let k = labels.iter().copied().max().map(|m| m + 1).unwrap_or(0);
    if k < 2 {
        return None;
    }
    let (centroids, counts) = label_centroids(x, labels, k);
    let mut scatter = vec![0.0; k];
    for (i, &c) in labels.iter().enumerate() {
        scatter[c] += euclidean_sq(x.row(i), centroids.row(c)).sqrt();
    }
    let present: Vec<usize> = (0..k).filter(|&c| counts[c] > 0).collect();
    if present.len() < 2 {
        return None;
    }
    for &c in &present {
        scatter[c] /= counts[c] as f64;
    }

    let total: f64 = present
        .iter()
        .map(|&a| {
            present
                .iter()
                .filter(|&&b| b != a)
                .map(|&b| {
                    let d = euclidean_sq(centroids.row(a), centroids.row(b)).sqrt();
                    if d > 0.0 { (scatter[a] + scatter[b]) / d } else { 0.0 }
                })
                .fold(0.0, f64::max)
        })
        .sum();
    Some(total / present.len() as f64)
}

/// Calinski-Harabasz index (higher is better); `None` unless 2 ≤ k < n
pub fn calinski_harabasz_score(x: &Array2<f64>, labels: &[usize]) -> Option<f64> {
    let n = x.nrows();
    let k = labels.iter().copied().max().map(|m| m + 1).unwrap_or(0);
    if k < 2 || n <= k {
        return None;
    }
    let overall = x.mean_axis(ndarray::Axis(0))?;
    let (centroids, counts) = label_centroids(x, labels, k);

    let between: f64 = (0..k)
        .map(|c| counts[c] as f64 * euclidean_sq(centroids.row(c), overall.view()))
        .sum();
    let within: f64 = labels
        .iter()
        .enumerate()
        .map(|(i, &c)| euclidean_sq(x.row(i), centroids.row(c)))
        .sum();
    if within <= 0.0 {
        return Some(1.0);
    }
    Some(between * (n - k) as f64 / (within * (k - 1) as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn blobs() -> Array2<f64> {
        array![
            [0.0, 0.0], [0.1, 0.2], [0.2, 0.1],
            [10.0, 10.0], [10.1, 10.2], [9.9, 10.1],
        ]
    }

    #[test]
    fn test_kmeans_finds_blobs() {
        let x = blobs();
        let mut km = KMeans::new(2);
        km.fit(&x).unwrap();

        let labels = km.labels().unwrap();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[2]);
        assert_ne!(labels[0], labels[3]);
        assert_eq!(km.cluster_sizes(), vec![3, 3]);
        assert!(km.inertia().unwrap() < 1.0);
    }

    #[test]
    fn test_silhouette_high_for_separated_blobs() {
        let x = blobs();
        let mut km = KMeans::new(2);
        km.fit(&x).unwrap();
        let score = silhouette_score(&x, km.labels().unwrap()).unwrap();
        assert!(score > 0.9);
        assert!(silhouette_score(&x, &[0, 0, 0, 0, 0, 0]).is_none());
    }

    #[test]
    fn test_dbscan_marks_outlier_as_noise() {
        let x = array![
            [0.0, 0.0], [0.1, 0.2], [0.2, 0.1],
            [10.0, 10.0], [10.1, 10.2], [9.9, 10.1],
            [50.0, -50.0],
        ];
        let mut db = DBSCAN::new(0.5, 2);
        db.fit(&x).unwrap();

        let labels = db.labels().unwrap();
        assert_eq!(db.n_clusters(), 2);
        assert_eq!(labels[0], Some(0));
        assert_eq!(labels[4], Some(1));
        assert_eq!(labels[6], None);
        assert_eq!(db.n_noise(), 1);
        assert_eq!(db.cluster_sizes(), vec![3, 3]);

        assert!(DBSCAN::new(0.0, 2).fit(&x).is_err());
    }

    #[test]
    fn test_agglomerative_linkages_agree_on_blobs() {
        let x = blobs();
        for linkage in [Linkage::Ward, Linkage::Complete, Linkage::Average, Linkage::Single] {
            let mut model = AgglomerativeClustering::new(2, linkage);
            model.fit(&x).unwrap();
            assert_eq!(model.labels().unwrap(), &[0, 0, 0, 1, 1, 1], "{:?}", linkage);
            assert_eq!(model.cluster_sizes(), vec![3, 3]);
        }
        assert!(AgglomerativeClustering::new(7, Linkage::Ward).fit(&x).is_err());
    }

    #[test]
    fn test_gaussian_mixture_fits_blobs() {
        let x = blobs();
        let mut gmm = GaussianMixture::new(2);
        gmm.fit(&x).unwrap();

        let labels = gmm.predict(&x).unwrap();
        assert_eq!(labels[0], labels[2]);
        assert_ne!(labels[0], labels[3]);
        let proba = gmm.predict_proba(&x).unwrap();
        assert!((proba.row(0).sum() - 1.0).abs() < 1e-9);
        assert!(proba[[0, labels[0]]] > 0.99);

        let weights = gmm.weights().unwrap();
        assert!((weights.sum() - 1.0).abs() < 1e-6);
        // ln(6) < 2, so BIC penalizes less than AIC here
        assert!(gmm.bic(6).unwrap() < gmm.aic().unwrap());
        assert!(gmm.log_likelihood().unwrap().is_finite());
    }

    #[test]
    fn test_internal_scores_favour_separated_blobs() {
        let x = blobs();
        let good = [0, 0, 0, 1, 1, 1];
        let bad = [0, 1, 0, 1, 0, 1];
        assert!(davies_bouldin_score(&x, &good).unwrap() < davies_bouldin_score(&x, &bad).unwrap());
        assert!(calinski_harabasz_score(&x, &good).unwrap() > calinski_harabasz_score(&x, &bad).unwrap());
        assert!(davies_bouldin_score(&x, &[0; 6]).is_none());
    }

    #[test]
    fn test_too_few_samples() {
        let mut km = KMeans::new(5);
        assert!(km.fit(&array![[1.0], [2.0]]).is_err());
    }
}
