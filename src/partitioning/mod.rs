//! Space partitioning.
//!
//! [`kmeans::KMeans`] learns both the IVF coarse centroids and the per-subspace
//! PQ codebooks.

pub mod kmeans;

pub use kmeans::KMeans;
