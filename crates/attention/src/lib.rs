//! Block-sparse attention kernels for the validation harness.
//!
//! The crate defines a portable API for computing block-sparse attention over
//! tensors with layout `[batch, seq_len, feature_dim]`. A sequence is split
//! into fixed-size query blocks, and each query block attends only to the
//! key/value blocks named by an explicit index assignment. The inputs `Q`,
//! `K`, and `V` share the same layout and dtype; the output matches the shape
//! and dtype of `V`.
//!
//! Two implementations of the [`BlockSparseAttention`] trait ship here: the
//! exact reference engine, which defines ground-truth semantics, and a fused
//! CPU kernel that is validated against it. Both receive the same
//! [`KernelConfig`], so score scaling and precision can never silently
//! diverge between an implementation under test and the ground truth.

pub mod core;
pub mod fused;
pub mod index;
pub mod reference;

pub use crate::core::{
    AttentionError, BlockSparseAttention, KernelConfig, PrecisionPolicy, ScoreScaling,
};
pub use crate::fused::FusedBlockSparse;
pub use crate::index::{BlockAssignment, BlockLayout};
pub use crate::reference::ExactBlockSparse;
