//! Core trait and types shared across block-sparse attention implementations.
//!
//! Implementations operate on tensors with layout `[batch, seq_len,
//! feature_dim]`. The block index assignment is a `u32` tensor shaped
//! `[batch, num_query_blocks, blocks_per_query]`; indices may repeat and need
//! not be sorted. The output tensor mirrors the layout and dtype of `v`.

pub mod config;
pub mod errors;

use candle_core::{DType, Tensor};

pub use config::{KernelConfig, PrecisionPolicy, ScoreScaling};
pub use errors::AttentionError;

/// Unified interface for block-sparse attention kernels.
///
/// * `q`, `k`, and `v` share the layout `[batch, seq_len, feature_dim]` and
///   the same dtype and device.
/// * `block_indices` is shaped `[batch, num_query_blocks, blocks_per_query]`
///   with dtype `u32`; every index must be below `num_query_blocks`.
/// * The returned tensor has the shape and dtype of `v` and is freshly
///   allocated; inputs are never mutated.
pub trait BlockSparseAttention {
    /// Compute block-sparse attention for a batch of sequences.
    fn forward(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        block_indices: &Tensor,
        config: &KernelConfig,
    ) -> Result<Tensor, AttentionError>;
}

/// Validate that `q`, `k`, and `v` satisfy the trait's tensor contract and
/// return the shared `(batch, seq_len, feature_dim)`.
pub fn check_qkv(q: &Tensor, k: &Tensor, v: &Tensor) -> Result<(usize, usize, usize), AttentionError> {
    let device = q.device();
    if !device.same_device(k.device()) || !device.same_device(v.device()) {
        return Err(AttentionError::shape(
            "q, k, v must reside on the same device",
        ));
    }

    let dtype = q.dtype();
    if dtype != k.dtype() || dtype != v.dtype() {
        return Err(AttentionError::shape("q, k, v must share the same dtype"));
    }
    if !matches!(dtype, DType::F32 | DType::F16 | DType::BF16) {
        return Err(AttentionError::Unsupported(format!(
            "dtype {dtype:?} is not a floating point input type"
        )));
    }

    let (batch, seq_len, feature_dim) = q
        .dims3()
        .map_err(|_| AttentionError::shape("q must have shape [batch, seq_len, feature_dim]"))?;
    let (kb, kt, kd) = k
        .dims3()
        .map_err(|_| AttentionError::shape("k must have shape [batch, seq_len, feature_dim]"))?;
    let (vb, vt, vd) = v
        .dims3()
        .map_err(|_| AttentionError::shape("v must have shape [batch, seq_len, feature_dim]"))?;

    if kb != batch || kd != feature_dim {
        return Err(AttentionError::shape(format!(
            "k shape mismatch: expected [{batch}, ?, {feature_dim}] got [{kb}, {kt}, {kd}]"
        )));
    }
    if vb != batch || vt != kt || vd != feature_dim {
        return Err(AttentionError::shape(format!(
            "v shape mismatch: expected [{batch}, {kt}, {feature_dim}] got [{vb}, {vt}, {vd}]"
        )));
    }
    if kt != seq_len {
        return Err(AttentionError::shape(format!(
            "k/v sequence length {kt} does not match q sequence length {seq_len}"
        )));
    }

    Ok((batch, seq_len, feature_dim))
}
