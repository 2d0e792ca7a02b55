//! Optimized CPU block-sparse attention candidate.
//!
//! Lowers the inputs to contiguous `f32` slices and walks the selected
//! key/value blocks with an online softmax, so no score matrix is
//! materialised. The per-(batch, query block) units are independent and are
//! processed in parallel once the workload is large enough.

use candle_core::{DType, Device, Tensor};
use rayon::prelude::*;

use crate::core::{check_qkv, AttentionError, BlockSparseAttention, KernelConfig};
use crate::index::{BlockAssignment, BlockLayout};

const PARALLEL_UNIT_THRESHOLD: usize = 8;

/// Flat-slice, online-softmax CPU kernel.
#[derive(Debug, Default)]
pub struct FusedBlockSparse;

impl FusedBlockSparse {
    pub fn new() -> Self {
        Self
    }
}

struct Workload<'a> {
    q: &'a [f32],
    k: &'a [f32],
    v: &'a [f32],
    layout: BlockLayout,
    assignment: &'a BlockAssignment,
    feature_dim: usize,
    scale: f32,
}

impl BlockSparseAttention for FusedBlockSparse {
    fn forward(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        block_indices: &Tensor,
        config: &KernelConfig,
    ) -> Result<Tensor, AttentionError> {
        if !matches!(q.device(), Device::Cpu) {
            return Err(AttentionError::Unsupported(
                "fused kernel only supports the cpu device".to_string(),
            ));
        }
        let (batch, seq_len, feature_dim) = check_qkv(q, k, v)?;
        let layout = BlockLayout::new(seq_len, config.block_size)?;
        let assignment = BlockAssignment::from_tensor(block_indices, batch, &layout)?;

        let dtype = q.dtype();
        let q_vec = q.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
        let k_vec = k.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
        let v_vec = v.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;

        let workload = Workload {
            q: &q_vec,
            k: &k_vec,
            v: &v_vec,
            layout,
            assignment: &assignment,
            feature_dim,
            scale: config.scaling.factor(feature_dim).unwrap_or(1.0),
        };

        let num_units = batch * layout.num_blocks();
        let unit_outputs: Vec<Vec<f32>> = if num_units < PARALLEL_UNIT_THRESHOLD {
            (0..num_units).map(|unit| compute_unit(&workload, unit)).collect()
        } else {
            (0..num_units)
                .into_par_iter()
                .map(|unit| compute_unit(&workload, unit))
                .collect()
        };

        // Each unit owns a disjoint row range of the output, so the merge is
        // a plain sequential copy.
        let mut output = vec![0f32; batch * seq_len * feature_dim];
        for (unit, rows) in unit_outputs.iter().enumerate() {
            let b = unit / layout.num_blocks();
            let qi = unit % layout.num_blocks();
            let span = layout.block_span(qi);
            let start = (b * seq_len + span.start) * feature_dim;
            output[start..start + rows.len()].copy_from_slice(rows);
        }

        let output = Tensor::from_vec(output, (batch, seq_len, feature_dim), q.device())?;
        Ok(output.to_dtype(dtype)?)
    }
}

/// Online-softmax attention for one (batch, query block) unit.
fn compute_unit(workload: &Workload<'_>, unit: usize) -> Vec<f32> {
    let d = workload.feature_dim;
    let seq_len = workload.layout.seq_len();
    let b = unit / workload.layout.num_blocks();
    let qi = unit % workload.layout.num_blocks();
    let span = workload.layout.block_span(qi);
    let batch_offset = b * seq_len * d;

    let mut rows = vec![0f32; span.len() * d];
    for (out_row, q_row) in span.clone().enumerate() {
        let q_start = batch_offset + q_row * d;
        let q_slice = &workload.q[q_start..q_start + d];

        let mut running_max = f32::NEG_INFINITY;
        let mut running_sum = 0f32;
        let mut acc = vec![0f32; d];

        for &selected in workload.assignment.selected(b, qi) {
            let kv_span = workload.layout.block_span(selected as usize);
            for key_row in kv_span {
                let k_start = batch_offset + key_row * d;
                let mut score = 0f32;
                for dim in 0..d {
                    score += q_slice[dim] * workload.k[k_start + dim];
                }
                score *= workload.scale;

                let new_max = running_max.max(score);
                let rescale = if running_max.is_finite() {
                    (running_max - new_max).exp()
                } else {
                    0.0
                };
                let weight = (score - new_max).exp();
                running_sum = running_sum * rescale + weight;
                let v_start = batch_offset + key_row * d;
                for dim in 0..d {
                    acc[dim] = acc[dim] * rescale + weight * workload.v[v_start + dim];
                }
                running_max = new_max;
            }
        }

        let out_start = out_row * d;
        for dim in 0..d {
            rows[out_start + dim] = acc[dim] / running_sum;
        }
    }
    rows
}
