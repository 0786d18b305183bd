//! Approximate nearest neighbor engines.
//!
//! Every engine implements [`AnnEngine`], the capability the block-journaled
//! session builds on:
//! - **IVF-PQ**: inverted file with product-quantized residuals, see
//!   [`crate::ivf_pq`]. The default engine.
//! - **Flat**: exact scan, see [`flat::FlatIndex`].

pub mod flat;
pub mod traits;

pub use flat::FlatIndex;
pub use traits::{AnnEngine, EngineStats};
