//! IVF-PQ: Inverted File with Product Quantization.
//!
//! Combines two ideas:
//!
//! 1. **IVF (Inverted File)**: Partition space into Voronoi cells, only search
//!    cells near the query
//! 2. **PQ (Product Quantization)**: Store each vector as a few bytes of
//!    codebook indices
//!
//! ## Residual encoding
//!
//! A vector is assigned to its nearest coarse centroid and PQ encodes the
//! residual `x - centroid`, not `x` itself. Residuals are small and centered,
//! so one set of codebooks serves every cell.
//!
//! ```text
//!           Query
//!             |
//!     +-------+-------+
//!     |               |
//!   Cell A          Cell B      (probe 2 cells)
//!   |__|__|         |__|__|
//!   v  v  v         v  v  v
//!  [codes]         [codes]      (ADC against q - centroid)
//! ```
//!
//! ## Asymmetric Distance Computation (ADC)
//!
//! The query is never compressed. For each probed cell, precompute squared
//! distances from the query residual's subvectors to every codeword; the
//! distance to a stored vector is then `num_codebooks` table lookups.
//!
//! ```text
//! d(q, x) ≈ Σᵢ table[i][code[i]]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use shardann::ann::AnnEngine;
//! use shardann::ivf_pq::{IVFPQIndex, IVFPQParams};
//!
//! let params = IVFPQParams {
//!     num_clusters: 2,
//!     nprobe: 2,
//!     num_codebooks: 2,
//!     codebook_size: 16,
//!     kmeans_iterations: 10,
//!     seed: Some(7),
//! };
//! let sample: Vec<f32> = (0..64).map(|i| (i % 13) as f32).collect();
//!
//! let mut index = IVFPQIndex::new(4, params)?;
//! index.train(&sample, 16)?;
//! index.add_with_ids(&sample[..8], &[100, 101])?;
//!
//! let results = index.search(&sample[..4], 1)?;
//! assert_eq!(results[0].0, 100);
//! # Ok::<(), shardann::IndexError>(())
//! ```
//!
//! ## Trade-offs
//!
//! | Parameter | ↑ Effect |
//! |-----------|----------|
//! | nprobe | Better recall, slower search |
//! | num_clusters | Better partitioning, slower training |
//! | num_codebooks | More memory, better accuracy |
//!
//! ## References
//!
//! - Jégou, Douze, Schmid (2011). "Product Quantization for Nearest Neighbor Search."

pub mod pq;
pub mod search;

pub use pq::{AdcTable, ProductQuantizer};
pub use search::{IVFPQIndex, IVFPQParams};
