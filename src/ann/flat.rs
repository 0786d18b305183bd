//! Exact brute-force engine.
//!
//! Stores full vectors and scans all of them per query. Training only fixes
//! the dimension. Useful as a recall baseline for the IVF-PQ engine and for
//! exercising the block/shard/merge pipeline with exact distances.

use super::traits::AnnEngine;
use crate::config::IndexConfig;
use crate::distance::l2_distance_squared;
use crate::error::{IndexError, Result};
use crate::VectorId;
use serde::{Deserialize, Serialize};

/// Exact L2 index over raw vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatIndex {
    dimension: usize,
    trained: bool,
    vectors: Vec<f32>,
    ids: Vec<VectorId>,
    ntotal: usize,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(IndexError::InvalidParameter(
                "dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            trained: false,
            vectors: Vec::new(),
            ids: Vec::new(),
            ntotal: 0,
        })
    }

    /// Stored vector for `id`, if present.
    pub fn vector(&self, id: VectorId) -> Option<&[f32]> {
        let pos = self.ids.iter().position(|&x| x == id)?;
        let start = pos * self.dimension;
        Some(&self.vectors[start..start + self.dimension])
    }

    /// Stored identifiers in storage order.
    pub fn ids(&self) -> &[VectorId] {
        &self.ids
    }
}

impl AnnEngine for FlatIndex {
    const ALGORITHM: &'static str = "Flat";

    fn from_config(config: &IndexConfig) -> Result<Self> {
        Self::new(config.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn train(&mut self, vectors: &[f32], num_vectors: usize) -> Result<()> {
        if vectors.len() != num_vectors * self.dimension {
            return Err(IndexError::InvalidParameter(format!(
                "training expected {} floats, got {}",
                num_vectors * self.dimension,
                vectors.len()
            )));
        }
        self.trained = true;
        Ok(())
    }

    fn add_with_ids(&mut self, vectors: &[f32], ids: &[VectorId]) -> Result<()> {
        if !self.trained {
            return Err(IndexError::UntrainedState);
        }
        if vectors.len() != ids.len() * self.dimension {
            return Err(IndexError::dimension(
                self.dimension,
                vectors.len() / ids.len().max(1),
            ));
        }
        self.vectors.extend_from_slice(vectors);
        self.ids.extend_from_slice(ids);
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
        self.vectors.extend(other.vectors);
        self.ids.extend(other.ids);
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
        let mut candidates: Vec<(VectorId, f32)> = self
            .vectors
            .chunks_exact(self.dimension)
            .zip(&self.ids)
            .map(|(v, &id)| (id, l2_distance_squared(query, v)))
            .collect();
        candidates.sort_unstable_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        candidates.truncate(k);
        Ok(candidates)
    }

    fn size_bytes(&self) -> usize {
        self.vectors.len() * std::mem::size_of::<f32>()
            + self.ids.len() * std::mem::size_of::<VectorId>()
    }
}
