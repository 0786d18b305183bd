//! Write buffer for block-journaled inserts.
//!
//! Assigns identifiers and accumulates vectors until a block is full. The
//! buffer never flushes by itself: [`BlockBuffer::push`] reports
//! [`BlockStatus::Full`] and the caller drains it with [`BlockBuffer::take`].

use crate::error::{IndexError, Result};
use crate::VectorId;

/// A block of `(vector, id)` pairs in insertion order.
///
/// Vectors are stored row-major in one flat buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub vectors: Vec<f32>,
    pub ids: Vec<VectorId>,
    pub dimension: usize,
}

impl Block {
    fn with_capacity(dimension: usize, capacity: usize) -> Self {
        Self {
            vectors: Vec::with_capacity(dimension * capacity),
            ids: Vec::with_capacity(capacity),
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Vector `idx` of the block.
    pub fn vector(&self, idx: usize) -> &[f32] {
        let start = idx * self.dimension;
        &self.vectors[start..start + self.dimension]
    }
}

/// Result of pushing one vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// The block can take more vectors.
    Open,
    /// The block just reached `block_size` and must be flushed.
    Full,
}

/// Identifier assignment plus the current in-memory block.
#[derive(Debug)]
pub struct BlockBuffer {
    dimension: usize,
    block_size: usize,
    next_id: VectorId,
    block: Block,
}

impl BlockBuffer {
    pub fn new(dimension: usize, block_size: usize) -> Result<Self> {
        if dimension == 0 || block_size == 0 {
            return Err(IndexError::InvalidParameter(
                "dimension and block_size must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            block_size,
            next_id: 0,
            block: Block::with_capacity(dimension, block_size),
        })
    }

    /// Reject a vector whose length is not the buffer dimension.
    pub fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(IndexError::dimension(self.dimension, vector.len()));
        }
        Ok(())
    }

    /// Append `vector` under the next identifier.
    ///
    /// A malformed vector is rejected without consuming an identifier.
    pub fn push(&mut self, vector: &[f32]) -> Result<(VectorId, BlockStatus)> {
        self.check_dimension(vector)?;

        let id = self.next_id;
        self.next_id += 1;
        self.block.vectors.extend_from_slice(vector);
        self.block.ids.push(id);

        let status = if self.block.len() >= self.block_size {
            BlockStatus::Full
        } else {
            BlockStatus::Open
        };
        Ok((id, status))
    }

    /// Move the current block out, leaving an empty one behind.
    pub fn take(&mut self) -> Block {
        std::mem::replace(
            &mut self.block,
            Block::with_capacity(self.dimension, self.block_size),
        )
    }

    /// Vectors currently buffered.
    pub fn len(&self) -> usize {
        self.block.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }

    /// Identifier the next accepted vector will get.
    pub fn next_id(&self) -> VectorId {
        self.next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_across_blocks() {
        let mut buffer = BlockBuffer::new(2, 3).unwrap();
        let mut ids = Vec::new();
        let mut full_at = Vec::new();

        for i in 0..7 {
            let (id, status) = buffer.push(&[i as f32, 0.0]).unwrap();
            ids.push(id);
            if status == BlockStatus::Full {
                full_at.push(i);
                assert_eq!(buffer.take().len(), 3);
            }
        }

        assert_eq!(ids, (0..7).collect::<Vec<_>>());
        assert_eq!(full_at, vec![2, 5]);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.next_id(), 7);
    }

    #[test]
    fn rejected_vector_does_not_consume_an_id() {
        let mut buffer = BlockBuffer::new(3, 4).unwrap();
        buffer.push(&[1.0, 2.0, 3.0]).unwrap();

        let err = buffer.push(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(buffer.next_id(), 1);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn take_preserves_order() {
        let mut buffer = BlockBuffer::new(1, 10).unwrap();
        for v in [5.0, 6.0, 7.0] {
            buffer.push(&[v]).unwrap();
        }
        let block = buffer.take();
        assert_eq!(block.ids, vec![0, 1, 2]);
        assert_eq!(block.vector(2), &[7.0]);
        assert!(buffer.is_empty());
        assert!(buffer.take().is_empty());
    }

    #[test]
    fn block_size_one_is_always_full() {
        let mut buffer = BlockBuffer::new(1, 1).unwrap();
        assert_eq!(buffer.push(&[0.0]).unwrap(), (0, BlockStatus::Full));
        buffer.take();
        assert_eq!(buffer.push(&[0.0]).unwrap(), (1, BlockStatus::Full));
    }
}
