//! Block index model: partitioning of a sequence into query blocks and the
//! per-block key/value selections.
//!
//! A sequence of length `T` splits into `ceil(T / block_size)` contiguous,
//! non-overlapping blocks. When `T` is not a multiple of `block_size` the
//! final block is short; a selected short block contributes only its real
//! rows. The union of block spans covers `[0, T)` exactly once.

use std::ops::Range;

use candle_core::{DType, Tensor};

use crate::core::AttentionError;

/// Partition of a sequence into fixed-size query blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    seq_len: usize,
    block_size: usize,
    num_blocks: usize,
}

impl BlockLayout {
    /// Build the layout for a sequence length and block size.
    pub fn new(seq_len: usize, block_size: usize) -> Result<Self, AttentionError> {
        if seq_len == 0 {
            return Err(AttentionError::InvalidConfiguration(
                "sequence length must be greater than 0".to_string(),
            ));
        }
        if block_size == 0 {
            return Err(AttentionError::InvalidConfiguration(
                "block_size must be greater than 0".to_string(),
            ));
        }
        let num_blocks = (seq_len + block_size - 1) / block_size;
        Ok(Self {
            seq_len,
            block_size,
            num_blocks,
        })
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of query blocks, `ceil(seq_len / block_size)`.
    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    /// Row range owned by block `index`. The final block may be shorter than
    /// `block_size`.
    pub fn block_span(&self, index: usize) -> Range<usize> {
        let start = index * self.block_size;
        let end = (start + self.block_size).min(self.seq_len);
        start..end
    }

    /// Iterate over all block spans in order.
    pub fn spans(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.num_blocks).map(|i| self.block_span(i))
    }

    /// Validate a per-query-block selection count against this layout.
    pub fn check_selection(&self, blocks_per_query: usize) -> Result<(), AttentionError> {
        if blocks_per_query == 0 {
            return Err(AttentionError::InvalidConfiguration(
                "blocks_per_query must be greater than 0".to_string(),
            ));
        }
        if blocks_per_query > self.num_blocks {
            return Err(AttentionError::InvalidConfiguration(format!(
                "blocks_per_query {} exceeds the {} available blocks",
                blocks_per_query, self.num_blocks
            )));
        }
        Ok(())
    }
}

/// A decoded block index assignment, validated against a layout.
///
/// Holds the flattened `u32` indices of a `[batch, num_query_blocks,
/// blocks_per_query]` tensor. Duplicate and unsorted indices are allowed;
/// out-of-range indices are rejected at construction.
#[derive(Debug, Clone)]
pub struct BlockAssignment {
    batch: usize,
    num_query_blocks: usize,
    blocks_per_query: usize,
    indices: Vec<u32>,
}

impl BlockAssignment {
    /// Decode and validate an assignment tensor for `batch` sequences laid
    /// out by `layout`.
    pub fn from_tensor(
        block_indices: &Tensor,
        batch: usize,
        layout: &BlockLayout,
    ) -> Result<Self, AttentionError> {
        if block_indices.dtype() != DType::U32 {
            return Err(AttentionError::shape(format!(
                "block indices must have dtype u32, got {:?}",
                block_indices.dtype()
            )));
        }
        let (ab, aq, asel) = block_indices.dims3().map_err(|_| {
            AttentionError::shape(
                "block indices must have shape [batch, num_query_blocks, blocks_per_query]",
            )
        })?;
        if ab != batch || aq != layout.num_blocks() {
            return Err(AttentionError::shape(format!(
                "block indices shape mismatch: expected [{}, {}, ?] got [{}, {}, {}]",
                batch,
                layout.num_blocks(),
                ab,
                aq,
                asel
            )));
        }
        layout.check_selection(asel)?;

        let indices = block_indices.flatten_all()?.to_vec1::<u32>()?;
        for &index in &indices {
            if index as usize >= layout.num_blocks() {
                return Err(AttentionError::IndexOutOfRange {
                    index: index as usize,
                    bound: layout.num_blocks(),
                });
            }
        }

        Ok(Self {
            batch,
            num_query_blocks: aq,
            blocks_per_query: asel,
            indices,
        })
    }

    pub fn blocks_per_query(&self) -> usize {
        self.blocks_per_query
    }

    /// Selected key/value block indices for `(batch, query_block)`, in
    /// assignment order, duplicates preserved.
    pub fn selected(&self, batch: usize, query_block: usize) -> &[u32] {
        debug_assert!(batch < self.batch && query_block < self.num_query_blocks);
        let start = (batch * self.num_query_blocks + query_block) * self.blocks_per_query;
        &self.indices[start..start + self.blocks_per_query]
    }
}
