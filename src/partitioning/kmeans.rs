//! k-means clustering implementation.
//!
//! Shared by the IVF coarse quantizer (partitioning the full space) and the
//! product quantizer (one codebook per subspace). Distances are squared L2.

use crate::distance::l2_distance_squared;
use crate::error::{IndexError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Centroid movement (squared) below which Lloyd iterations stop.
const CONVERGENCE_EPSILON: f32 = 1e-10;

/// k-means clustering for partitioning vectors.
///
/// k-means++ initialization followed by Lloyd refinement. Input vectors are
/// a flat row-major slice (`num_vectors * dimension` floats).
#[derive(Debug, Clone)]
pub struct KMeans {
    /// Centroids (k x dimension)
    centroids: Vec<Vec<f32>>,
    dimension: usize,
    k: usize,
    max_iterations: usize,
    seed: Option<u64>,
}

impl KMeans {
    /// Create new k-means with k clusters.
    pub fn new(dimension: usize, k: usize) -> Result<Self> {
        if dimension == 0 || k == 0 {
            return Err(IndexError::InvalidParameter(
                "k-means dimension and k must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            centroids: Vec::new(),
            dimension,
            k,
            max_iterations: 25,
            seed: None,
        })
    }

    /// Configure a deterministic seed for k-means++ initialization.
    ///
    /// When set, repeated `fit(...)` calls on the same inputs produce identical results.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Same as [`KMeans::with_seed`] but accepts an optional seed.
    #[must_use]
    pub fn with_optional_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Cap the number of Lloyd iterations.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Train k-means on vectors.
    ///
    /// With fewer distinct points than `k`, every distinct point becomes a
    /// centroid and [`KMeans::centroids`] returns fewer than `k` rows.
    pub fn fit(&mut self, vectors: &[f32], num_vectors: usize) -> Result<()> {
        if num_vectors == 0 {
            return Err(IndexError::InvalidParameter(
                "k-means needs at least one training vector".to_string(),
            ));
        }
        if vectors.len() < num_vectors * self.dimension {
            return Err(IndexError::InvalidParameter(format!(
                "k-means expected {} floats, got {}",
                num_vectors * self.dimension,
                vectors.len()
            )));
        }

        if num_vectors <= self.k {
            self.centroids = self.distinct_points(vectors, num_vectors);
            if self.centroids.len() < self.k {
                tracing::warn!(
                    requested = self.k,
                    effective = self.centroids.len(),
                    "k-means sample smaller than k; using each distinct point as a centroid"
                );
            }
            return Ok(());
        }

        let seed = self.seed.unwrap_or_else(|| rand::rng().random());
        let mut rng = StdRng::seed_from_u64(seed);
        self.centroids = self.kmeans_plus_plus(vectors, num_vectors, &mut rng);

        for iteration in 0..self.max_iterations {
            let assignments = self.assign_clusters(vectors, num_vectors);
            let new_centroids = self.update_centroids(vectors, &assignments);

            let converged = self
                .centroids
                .iter()
                .zip(new_centroids.iter())
                .all(|(old, new)| l2_distance_squared(old, new) <= CONVERGENCE_EPSILON);

            self.centroids = new_centroids;
            if converged {
                tracing::trace!(iteration, "k-means converged");
                break;
            }
        }

        Ok(())
    }

    /// Unique rows of `vectors`, in first-seen order.
    fn distinct_points(&self, vectors: &[f32], num_vectors: usize) -> Vec<Vec<f32>> {
        let mut out: Vec<Vec<f32>> = Vec::with_capacity(num_vectors);
        for i in 0..num_vectors {
            let v = self.get_vector(vectors, i);
            if !out.iter().any(|c| c.as_slice() == v) {
                out.push(v.to_vec());
            }
        }
        out
    }

    /// k-means++ initialization: sample proportional to D².
    fn kmeans_plus_plus(
        &self,
        vectors: &[f32],
        num_vectors: usize,
        rng: &mut StdRng,
    ) -> Vec<Vec<f32>> {
        let mut centroids = Vec::with_capacity(self.k);

        let first_idx = rng.random_range(0..num_vectors);
        centroids.push(self.get_vector(vectors, first_idx).to_vec());

        let mut min_dists = vec![f32::INFINITY; num_vectors];

        for _ in 1..self.k {
            let last = centroids.last().map(Vec::as_slice).unwrap_or_default();
            let mut total = 0.0f64;
            for (i, slot) in min_dists.iter_mut().enumerate() {
                let d = l2_distance_squared(self.get_vector(vectors, i), last);
                if d < *slot {
                    *slot = d;
                }
                total += *slot as f64;
            }

            // All points coincide with existing centroids.
            if total <= f64::EPSILON {
                let idx = rng.random_range(0..num_vectors);
                centroids.push(self.get_vector(vectors, idx).to_vec());
                continue;
            }

            let threshold = rng.random::<f64>() * total;
            let mut cumulative = 0.0f64;
            let mut chosen = num_vectors - 1;
            for (i, &d) in min_dists.iter().enumerate() {
                cumulative += d as f64;
                if cumulative >= threshold {
                    chosen = i;
                    break;
                }
            }
            centroids.push(self.get_vector(vectors, chosen).to_vec());
        }

        centroids
    }

    /// Index of the nearest centroid to `vector`.
    pub fn assign(&self, vector: &[f32]) -> usize {
        crate::distance::nearest(vector, &self.centroids)
            .map(|(idx, _)| idx)
            .unwrap_or(0)
    }

    /// Assign vectors to nearest clusters.
    pub fn assign_clusters(&self, vectors: &[f32], num_vectors: usize) -> Vec<usize> {
        (0..num_vectors)
            .map(|i| self.assign(self.get_vector(vectors, i)))
            .collect()
    }

    /// Update centroids as cluster means. Empty clusters keep their previous centroid.
    fn update_centroids(&self, vectors: &[f32], assignments: &[usize]) -> Vec<Vec<f32>> {
        let k = self.centroids.len();
        let mut cluster_sums = vec![vec![0.0f32; self.dimension]; k];
        let mut cluster_counts = vec![0usize; k];

        for (i, &cluster) in assignments.iter().enumerate() {
            cluster_counts[cluster] += 1;
            for (sum, &val) in cluster_sums[cluster]
                .iter_mut()
                .zip(self.get_vector(vectors, i))
            {
                *sum += val;
            }
        }

        cluster_sums
            .into_iter()
            .zip(cluster_counts)
            .zip(self.centroids.iter())
            .map(|((sums, count), old)| {
                if count > 0 {
                    sums.into_iter().map(|s| s / count as f32).collect()
                } else {
                    old.clone()
                }
            })
            .collect()
    }

    /// Get vector from row-major storage.
    fn get_vector<'a>(&self, vectors: &'a [f32], idx: usize) -> &'a [f32] {
        let start = idx * self.dimension;
        &vectors[start..start + self.dimension]
    }

    /// Get centroids.
    pub fn centroids(&self) -> &[Vec<f32>] {
        &self.centroids
    }

    /// Consume the model, returning its centroids.
    pub fn into_centroids(self) -> Vec<Vec<f32>> {
        self.centroids
    }
}
