//! IVF-PQ index: training, explicit-id inserts, list merging, and search.

use super::pq::ProductQuantizer;
use crate::ann::AnnEngine;
use crate::config::IndexConfig;
use crate::distance::nearest;
use crate::error::{IndexError, Result};
use crate::partitioning::KMeans;
use crate::simd;
use crate::VectorId;
use serde::{Deserialize, Serialize};

/// IVF-PQ parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IVFPQParams {
    /// Number of clusters (inverted lists)
    pub num_clusters: usize,

    /// Number of clusters to search (nprobe)
    pub nprobe: usize,

    /// Product quantization: number of codebooks
    pub num_codebooks: usize,

    /// Product quantization: codebook size
    pub codebook_size: usize,

    /// Lloyd iteration cap for coarse and PQ k-means
    pub kmeans_iterations: usize,

    /// Training seed; `None` draws from entropy
    pub seed: Option<u64>,
}

impl Default for IVFPQParams {
    fn default() -> Self {
        Self {
            num_clusters: 1024,
            nprobe: 16,
            num_codebooks: 8,
            codebook_size: 256,
            kmeans_iterations: 25,
            seed: None,
        }
    }
}

impl From<&IndexConfig> for IVFPQParams {
    fn from(config: &IndexConfig) -> Self {
        Self {
            num_clusters: config.num_clusters,
            nprobe: config.nprobe,
            num_codebooks: config.num_codebooks,
            codebook_size: config.codebook_size,
            kmeans_iterations: config.kmeans_iterations,
            seed: config.seed,
        }
    }
}

/// Inverted list: identifiers and their PQ codes, `code_size` bytes per id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct InvertedList {
    ids: Vec<VectorId>,
    codes: Vec<u8>,
}

impl InvertedList {
    fn len(&self) -> usize {
        self.ids.len()
    }

    fn append(&mut self, other: InvertedList) {
        self.ids.extend(other.ids);
        self.codes.extend(other.codes);
    }
}

/// IVF-PQ index for memory-efficient approximate nearest neighbor search.
///
/// Vectors are assigned to their nearest coarse centroid and stored only as
/// PQ codes of their residual (`x - centroid`). Search probes the `nprobe`
/// nearest lists and ranks by ADC distance, which approximates squared L2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IVFPQIndex {
    dimension: usize,
    params: IVFPQParams,

    // IVF components
    centroids: Vec<Vec<f32>>,
    lists: Vec<InvertedList>,

    // PQ components
    pq: Option<ProductQuantizer>,

    ntotal: usize,
}

impl IVFPQIndex {
    /// Create a new, untrained IVF-PQ index.
    pub fn new(dimension: usize, params: IVFPQParams) -> Result<Self> {
        if dimension == 0 {
            return Err(IndexError::InvalidParameter(
                "dimension must be greater than 0".to_string(),
            ));
        }
        if params.num_clusters == 0 || params.nprobe == 0 {
            return Err(IndexError::InvalidParameter(
                "num_clusters and nprobe must be greater than 0".to_string(),
            ));
        }
        // Validates the PQ shape up front.
        ProductQuantizer::new(dimension, params.num_codebooks, params.codebook_size)?;

        Ok(Self {
            dimension,
            params,
            centroids: Vec::new(),
            lists: Vec::new(),
            pq: None,
            ntotal: 0,
        })
    }

    pub fn params(&self) -> &IVFPQParams {
        &self.params
    }

    /// Change the number of probed lists. Takes effect on the next search.
    pub fn set_nprobe(&mut self, nprobe: usize) {
        self.params.nprobe = nprobe.max(1);
    }

    /// Number of inverted lists after training.
    pub fn num_lists(&self) -> usize {
        self.lists.len()
    }

    /// Entry count of each inverted list.
    pub fn list_sizes(&self) -> Vec<usize> {
        self.lists.iter().map(InvertedList::len).collect()
    }

    /// Every stored `(list, id, codes)` triple, list by list.
    pub fn postings(&self) -> impl Iterator<Item = (usize, VectorId, &[u8])> + '_ {
        let code_size = self.params.num_codebooks;
        self.lists.iter().enumerate().flat_map(move |(list_no, list)| {
            list.ids
                .iter()
                .zip(list.codes.chunks_exact(code_size))
                .map(move |(&id, codes)| (list_no, id, codes))
        })
    }

    fn quantizer(&self) -> Result<&ProductQuantizer> {
        self.pq.as_ref().ok_or(IndexError::UntrainedState)
    }

    fn row<'a>(&self, vectors: &'a [f32], idx: usize) -> &'a [f32] {
        let start = idx * self.dimension;
        &vectors[start..start + self.dimension]
    }
}

impl AnnEngine for IVFPQIndex {
    const ALGORITHM: &'static str = "IVF-PQ";

    fn from_config(config: &IndexConfig) -> Result<Self> {
        Self::new(config.dimension, IVFPQParams::from(config))
    }

    fn configure_search(&mut self, config: &IndexConfig) {
        self.set_nprobe(config.nprobe);
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn is_trained(&self) -> bool {
        self.pq.is_some() && !self.centroids.is_empty()
    }

    fn train(&mut self, vectors: &[f32], num_vectors: usize) -> Result<()> {
        if self.ntotal > 0 {
            return Err(IndexError::InvalidState(
                "cannot retrain an index that holds vectors".to_string(),
            ));
        }
        if vectors.len() != num_vectors * self.dimension {
            return Err(IndexError::InvalidParameter(format!(
                "training expected {} floats, got {}",
                num_vectors * self.dimension,
                vectors.len()
            )));
        }

        // Stage 1: coarse k-means for the inverted lists
        let mut kmeans = KMeans::new(self.dimension, self.params.num_clusters)?
            .with_max_iterations(self.params.kmeans_iterations)
            .with_optional_seed(self.params.seed);
        kmeans.fit(vectors, num_vectors)?;
        let assignments = kmeans.assign_clusters(vectors, num_vectors);
        let centroids = kmeans.into_centroids();

        // Stage 2: PQ over residuals
        let mut residuals = vec![0.0f32; vectors.len()];
        for (i, &cluster) in assignments.iter().enumerate() {
            let start = i * self.dimension;
            simd::sub_into(
                self.row(vectors, i),
                &centroids[cluster],
                &mut residuals[start..start + self.dimension],
            );
        }
        let mut pq = ProductQuantizer::new(
            self.dimension,
            self.params.num_codebooks,
            self.params.codebook_size,
        )?;
        pq.fit(
            &residuals,
            num_vectors,
            self.params.kmeans_iterations,
            self.params.seed,
        )?;

        self.lists = vec![InvertedList::default(); centroids.len()];
        self.centroids = centroids;
        self.pq = Some(pq);
        Ok(())
    }

    fn add_with_ids(&mut self, vectors: &[f32], ids: &[VectorId]) -> Result<()> {
        if !self.is_trained() {
            return Err(IndexError::UntrainedState);
        }
        if vectors.len() != ids.len() * self.dimension {
            return Err(IndexError::dimension(
                self.dimension,
                vectors.len() / ids.len().max(1),
            ));
        }

        let mut residual = vec![0.0f32; self.dimension];
        for (i, &id) in ids.iter().enumerate() {
            let vector = self.row(vectors, i);
            let (list_no, _) =
                nearest(vector, &self.centroids).ok_or(IndexError::UntrainedState)?;
            simd::sub_into(vector, &self.centroids[list_no], &mut residual);

            let pq = self.pq.as_ref().ok_or(IndexError::UntrainedState)?;
            let list = &mut self.lists[list_no];
            pq.quantize_into(&residual, &mut list.codes);
            list.ids.push(id);
        }
        self.ntotal += ids.len();
        Ok(())
    }

    fn merge_from(&mut self, other: Self) -> Result<()> {
        if other.dimension != self.dimension {
            return Err(IndexError::IncompatibleShard(format!(
                "dimension {} != {}",
                other.dimension, self.dimension
            )));
        }
        if other.lists.len() != self.lists.len() {
            return Err(IndexError::IncompatibleShard(format!(
                "{} inverted lists != {}",
                other.lists.len(),
                self.lists.len()
            )));
        }
        if other.centroids != self.centroids || other.pq != self.pq {
            return Err(IndexError::IncompatibleShard(
                "shard was trained from a different quantizer".to_string(),
            ));
        }

        for (mine, theirs) in self.lists.iter_mut().zip(other.lists) {
            mine.append(theirs);
        }
        self.ntotal += other.ntotal;
        Ok(())
    }

    fn ntotal(&self) -> usize {
        self.ntotal
    }

    fn set_ntotal(&mut self, ntotal: usize) {
        self.ntotal = ntotal;
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(VectorId, f32)>> {
        if query.len() != self.dimension {
            return Err(IndexError::dimension(self.dimension, query.len()));
        }
        let pq = self.quantizer()?;
        if k == 0 {
            return Ok(Vec::new());
        }

        // Find closest clusters
        let mut cluster_distances: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(idx, centroid)| (idx, simd::l2_distance_squared(query, centroid)))
            .collect();
        cluster_distances.sort_unstable_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        let code_size = pq.code_size();
        let mut residual = vec![0.0f32; self.dimension];
        let mut candidates = Vec::new();

        for &(list_no, _) in cluster_distances.iter().take(self.params.nprobe) {
            let list = &self.lists[list_no];
            if list.ids.is_empty() {
                continue;
            }

            // The ADC table is per list: codes encode residuals to this centroid.
            simd::sub_into(query, &self.centroids[list_no], &mut residual);
            let adc_table = pq.compute_adc_table(&residual)?;

            for (&id, codes) in list.ids.iter().zip(list.codes.chunks_exact(code_size)) {
                candidates.push((id, pq.distance_with_table(&adc_table, codes)));
            }
        }

        candidates.sort_unstable_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        candidates.truncate(k);
        Ok(candidates)
    }

    fn size_bytes(&self) -> usize {
        let centroid_bytes = self.centroids.len() * self.dimension * std::mem::size_of::<f32>();
        let codebook_bytes = self.pq.as_ref().map_or(0, |pq| {
            pq.codebooks()
                .iter()
                .flatten()
                .map(|c| c.len() * std::mem::size_of::<f32>())
                .sum()
        });
        let list_bytes: usize = self
            .lists
            .iter()
            .map(|l| l.codes.len() + l.ids.len() * std::mem::size_of::<VectorId>())
            .sum();
        centroid_bytes + codebook_bytes + list_bytes
    }
}
