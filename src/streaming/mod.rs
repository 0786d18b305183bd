//! Streaming inserts in fixed-size blocks.
//!
//! ```text
//! Stream of vectors
//!     │
//!     ▼
//! ┌──────────────┐
//! │ BlockBuffer  │ ◄── assigns ids, reports Full
//! └──────┬───────┘
//!        │ take()
//!        ▼
//! ┌──────────────┐
//! │ ShardWriter  │ ◄── one shard per block
//! └──────────────┘
//! ```

pub mod buffer;

pub use buffer::{Block, BlockBuffer, BlockStatus};
