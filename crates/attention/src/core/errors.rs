//! Error types emitted by block-sparse attention implementations.

use thiserror::Error;

/// Attention-specific error category.
#[derive(Error, Debug)]
pub enum AttentionError {
    /// Block or selection parameters are inconsistent; detected before any
    /// computation starts.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The supplied tensor shapes do not align with the documented contract.
    #[error("shape mismatch: {context}")]
    ShapeMismatch { context: String },

    /// A block index assignment references a block that does not exist.
    #[error("block index {index} out of range (num_query_blocks = {bound})")]
    IndexOutOfRange { index: usize, bound: usize },

    /// The kernel does not support the requested dtype or device.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A backend failure propagated from the tensor library.
    #[error("backend error: {0}")]
    Backend(#[from] candle_core::Error),
}

impl AttentionError {
    pub(crate) fn shape(context: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
        }
    }
}
