//! Reference block-sparse attention engine.
//!
//! The exact path prioritises numerical fidelity and defines the semantics of
//! the [`BlockSparseAttention`](crate::core::BlockSparseAttention) trait: per
//! query block, gather the selected key/value blocks in assignment order
//! (duplicates included), apply a numerically stable softmax over the
//! gathered keys, and produce the weighted sum of the gathered values.

use std::sync::OnceLock;

use candle_core::{DType, Tensor};
use candle_nn::ops::softmax_last_dim;

use crate::core::{check_qkv, AttentionError, BlockSparseAttention, KernelConfig, PrecisionPolicy};
use crate::index::{BlockAssignment, BlockLayout};

/// Full-precision reference kernel.
#[derive(Debug, Default)]
pub struct ExactBlockSparse {
    first_call: OnceLock<()>,
}

impl ExactBlockSparse {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockSparseAttention for ExactBlockSparse {
    fn forward(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        block_indices: &Tensor,
        config: &KernelConfig,
    ) -> Result<Tensor, AttentionError> {
        let (batch, seq_len, feature_dim) = check_qkv(q, k, v)?;
        let layout = BlockLayout::new(seq_len, config.block_size)?;
        let assignment = BlockAssignment::from_tensor(block_indices, batch, &layout)?;

        if self.first_call.set(()).is_ok() {
            log::info!(
                "attention::reference init batch={batch} seq_len={seq_len} feature_dim={feature_dim} \
                 block_size={} num_query_blocks={} blocks_per_query={} scaling={:?} precision={:?}",
                config.block_size,
                layout.num_blocks(),
                assignment.blocks_per_query(),
                config.scaling,
                config.precision
            );
        }

        let dtype = q.dtype();
        let (q_work, k_work, v_work) = match config.precision {
            PrecisionPolicy::ForceF32 => (
                q.to_dtype(DType::F32)?,
                k.to_dtype(DType::F32)?,
                v.to_dtype(DType::F32)?,
            ),
            PrecisionPolicy::Inherit => (q.clone(), k.clone(), v.clone()),
        };
        let scale = config.scaling.factor(feature_dim);

        let mut batch_outputs = Vec::with_capacity(batch);
        for b in 0..batch {
            let q_b = q_work.get(b)?;
            let k_b = k_work.get(b)?;
            let v_b = v_work.get(b)?;

            let mut block_outputs = Vec::with_capacity(layout.num_blocks());
            for qi in 0..layout.num_blocks() {
                let span = layout.block_span(qi);
                let q_blk = q_b.narrow(0, span.start, span.len())?;

                let mut key_slices = Vec::with_capacity(assignment.blocks_per_query());
                let mut value_slices = Vec::with_capacity(assignment.blocks_per_query());
                for &selected in assignment.selected(b, qi) {
                    let kv_span = layout.block_span(selected as usize);
                    key_slices.push(k_b.narrow(0, kv_span.start, kv_span.len())?);
                    value_slices.push(v_b.narrow(0, kv_span.start, kv_span.len())?);
                }
                let key_refs: Vec<&Tensor> = key_slices.iter().collect();
                let value_refs: Vec<&Tensor> = value_slices.iter().collect();
                let keys = Tensor::cat(&key_refs, 0)?;
                let values = Tensor::cat(&value_refs, 0)?;

                let mut scores = q_blk.matmul(&keys.t()?)?;
                if let Some(scale) = scale {
                    scores = scores.affine(scale as f64, 0.0)?;
                }
                let probs = softmax_last_dim(&scores)?;
                block_outputs.push(probs.matmul(&values)?);
            }

            let block_refs: Vec<&Tensor> = block_outputs.iter().collect();
            batch_outputs.push(Tensor::cat(&block_refs, 0)?);
        }

        let batch_refs: Vec<&Tensor> = batch_outputs.iter().collect();
        let output = Tensor::stack(&batch_refs, 0)?;
        Ok(output.to_dtype(dtype)?)
    }
}
