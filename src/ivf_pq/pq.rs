//! Product Quantization (PQ) implementation.

use crate::distance::l2_distance_squared;
use crate::error::{IndexError, Result};
use crate::partitioning::KMeans;

use serde::{Deserialize, Serialize};

/// Product Quantizer.
///
/// Decomposes vectors into `num_codebooks` subvectors and quantizes each
/// subvector independently against its own codebook. One `u8` code per
/// subvector, so `codebook_size` is capped at 256.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductQuantizer {
    dimension: usize,
    num_codebooks: usize,
    codebook_size: usize,
    subvector_dim: usize,
    codebooks: Vec<Vec<Vec<f32>>>, // [codebook][codeword][dimension]
}

/// Asymmetric distance table for one query: `num_codebooks` rows of
/// `stride` partial squared distances.
#[derive(Debug, Clone)]
pub struct AdcTable {
    table: Vec<f32>,
    stride: usize,
}

impl AdcTable {
    /// Partial distance from query subvector `codebook` to codeword `code`.
    #[inline]
    pub fn get(&self, codebook: usize, code: u8) -> f32 {
        self.table[codebook * self.stride + code as usize]
    }
}

impl ProductQuantizer {
    /// Create new product quantizer.
    pub fn new(dimension: usize, num_codebooks: usize, codebook_size: usize) -> Result<Self> {
        if dimension == 0 || num_codebooks == 0 || codebook_size == 0 {
            return Err(IndexError::InvalidParameter(
                "All PQ parameters must be greater than 0".to_string(),
            ));
        }

        if dimension % num_codebooks != 0 {
            return Err(IndexError::InvalidParameter(format!(
                "Dimension {dimension} must be divisible by num_codebooks {num_codebooks}"
            )));
        }

        if codebook_size > 256 {
            return Err(IndexError::InvalidParameter(format!(
                "codebook_size {codebook_size} does not fit a u8 code"
            )));
        }

        Ok(Self {
            dimension,
            num_codebooks,
            codebook_size,
            subvector_dim: dimension / num_codebooks,
            codebooks: Vec::new(),
        })
    }

    /// Train one k-means codebook per subspace.
    ///
    /// With fewer distinct subvectors than `codebook_size`, a codebook holds
    /// exactly those subvectors and encodes them without error.
    pub fn fit(
        &mut self,
        vectors: &[f32],
        num_vectors: usize,
        iterations: usize,
        seed: Option<u64>,
    ) -> Result<()> {
        if vectors.len() != num_vectors * self.dimension {
            return Err(IndexError::InvalidParameter(format!(
                "PQ training expected {} floats, got {}",
                num_vectors * self.dimension,
                vectors.len()
            )));
        }

        let mut codebooks = Vec::with_capacity(self.num_codebooks);
        let mut flat = Vec::with_capacity(num_vectors * self.subvector_dim);

        for codebook_idx in 0..self.num_codebooks {
            let start_dim = codebook_idx * self.subvector_dim;
            let end_dim = start_dim + self.subvector_dim;

            flat.clear();
            for row in vectors.chunks_exact(self.dimension) {
                flat.extend_from_slice(&row[start_dim..end_dim]);
            }

            let mut kmeans = KMeans::new(self.subvector_dim, self.codebook_size)?
                .with_max_iterations(iterations)
                .with_optional_seed(seed.map(|s| s.wrapping_add(codebook_idx as u64 + 1)));
            kmeans.fit(&flat, num_vectors)?;

            codebooks.push(kmeans.into_centroids());
        }

        self.codebooks = codebooks;
        Ok(())
    }

    /// Whether `fit` has run.
    pub fn is_trained(&self) -> bool {
        !self.codebooks.is_empty()
    }

    /// Bytes of code per vector.
    pub fn code_size(&self) -> usize {
        self.num_codebooks
    }

    /// Vector dimension this quantizer encodes.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Quantize a vector.
    ///
    /// Returns codebook indices for each subvector.
    pub fn quantize(&self, vector: &[f32]) -> Vec<u8> {
        let mut codes = Vec::with_capacity(self.num_codebooks);
        self.quantize_into(vector, &mut codes);
        codes
    }

    /// Quantize a vector, appending its codes to `out`.
    pub fn quantize_into(&self, vector: &[f32], out: &mut Vec<u8>) {
        for (codebook_idx, codebook) in self.codebooks.iter().enumerate() {
            let start_dim = codebook_idx * self.subvector_dim;
            let subvector = &vector[start_dim..start_dim + self.subvector_dim];

            let mut best_code = 0u8;
            let mut best_dist = f32::INFINITY;
            for (code, codeword) in codebook.iter().enumerate() {
                let dist = l2_distance_squared(subvector, codeword);
                if dist < best_dist {
                    best_dist = dist;
                    best_code = code as u8;
                }
            }
            out.push(best_code);
        }
    }

    /// Decode codes back to an approximate vector.
    pub fn reconstruct(&self, codes: &[u8]) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dimension);
        for (codebook, &code) in self.codebooks.iter().zip(codes) {
            out.extend_from_slice(&codebook[code as usize]);
        }
        out
    }

    /// Compute ADC (Asymmetric Distance Computation) lookup table.
    ///
    /// Precomputes squared distances from each query subvector to every
    /// codeword of its codebook. Slots past a short codebook's end hold
    /// `f32::INFINITY`; no stored code points at them.
    pub fn compute_adc_table(&self, query: &[f32]) -> Result<AdcTable> {
        if query.len() != self.dimension {
            return Err(IndexError::dimension(self.dimension, query.len()));
        }

        let stride = self.codebook_size;
        let mut table = vec![f32::INFINITY; self.num_codebooks * stride];

        for (codebook_idx, codebook) in self.codebooks.iter().enumerate() {
            let start_dim = codebook_idx * self.subvector_dim;
            let query_subvector = &query[start_dim..start_dim + self.subvector_dim];
            let row = &mut table[codebook_idx * stride..(codebook_idx + 1) * stride];
            for (slot, codeword) in row.iter_mut().zip(codebook) {
                *slot = l2_distance_squared(query_subvector, codeword);
            }
        }

        Ok(AdcTable { table, stride })
    }

    /// Compute distance using ADC table.
    ///
    /// Only table lookups and additions.
    #[inline]
    pub fn distance_with_table(&self, table: &AdcTable, codes: &[u8]) -> f32 {
        codes
            .iter()
            .enumerate()
            .map(|(codebook_idx, &code)| table.get(codebook_idx, code))
            .sum()
    }

    /// Get codebooks (for testing/debugging).
    pub fn codebooks(&self) -> &[Vec<Vec<f32>>] {
        &self.codebooks
    }
}
