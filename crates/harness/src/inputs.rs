//! Deterministic input generation.
//!
//! All randomness flows through a caller-owned, explicitly seeded generator;
//! there is no hidden global state. Repeated runs with the same seed see
//! bit-identical inputs.

use attention::BlockLayout;
use candle_core::{Device, Tensor};
use rand::{rngs::StdRng, Rng};
use rand_distr::StandardNormal;

use crate::config::HarnessError;

/// Generate query, key, and value tensors with independent standard-normal
/// entries, shaped `[batch, seq_len, feature_dim]`.
pub fn generate_qkv(
    rng: &mut StdRng,
    batch: usize,
    seq_len: usize,
    feature_dim: usize,
    device: &Device,
) -> Result<(Tensor, Tensor, Tensor), HarnessError> {
    let shape = (batch, seq_len, feature_dim);
    let total = batch * seq_len * feature_dim;
    let q = Tensor::from_vec(standard_normal(rng, total), shape, device)
        .map_err(attention::AttentionError::from)?;
    let k = Tensor::from_vec(standard_normal(rng, total), shape, device)
        .map_err(attention::AttentionError::from)?;
    let v = Tensor::from_vec(standard_normal(rng, total), shape, device)
        .map_err(attention::AttentionError::from)?;
    Ok((q, k, v))
}

/// Sample a block index assignment uniformly over the available blocks,
/// shaped `[batch, num_query_blocks, blocks_per_query]` with dtype `u32`.
/// Duplicate indices are expected and left as sampled.
pub fn generate_assignment(
    rng: &mut StdRng,
    batch: usize,
    layout: &BlockLayout,
    blocks_per_query: usize,
    device: &Device,
) -> Result<Tensor, HarnessError> {
    layout.check_selection(blocks_per_query)?;
    let num_blocks = layout.num_blocks() as u32;
    let total = batch * layout.num_blocks() * blocks_per_query;
    let indices: Vec<u32> = (0..total).map(|_| rng.gen_range(0..num_blocks)).collect();
    let tensor = Tensor::from_vec(
        indices,
        (batch, layout.num_blocks(), blocks_per_query),
        device,
    )
    .map_err(attention::AttentionError::from)?;
    Ok(tensor)
}

fn standard_normal(rng: &mut StdRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.sample(StandardNormal)).collect()
}
