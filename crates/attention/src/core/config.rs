//! Configuration shared by every block-sparse attention implementation.
//!
//! The reference engine and all candidates receive the same [`KernelConfig`],
//! so score scaling and precision can never silently diverge between the
//! ground truth and an implementation under test.

/// Scaling applied to raw attention scores before the softmax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreScaling {
    /// Raw dot products, no scaling. Matches kernels whose documented
    /// contract omits the conventional factor.
    None,
    /// The conventional `1 / sqrt(D)` factor.
    InverseSqrtDim,
}

impl ScoreScaling {
    /// Multiplier for a given feature dimension, or `None` when scores are
    /// left untouched.
    pub fn factor(self, feature_dim: usize) -> Option<f32> {
        match self {
            ScoreScaling::None => None,
            ScoreScaling::InverseSqrtDim => Some(1.0 / (feature_dim as f32).sqrt()),
        }
    }
}

/// Working precision for the score/softmax/output chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecisionPolicy {
    /// Upcast inputs to `f32` before computing; output is cast back to the
    /// input dtype.
    ForceF32,
    /// Compute in the dtype of the inputs.
    Inherit,
}

/// Configuration driving block-sparse attention behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelConfig {
    /// Number of sequence positions per block.
    pub block_size: usize,
    /// Score scaling policy shared by reference and candidates.
    pub scaling: ScoreScaling,
    /// Working precision; the reference never computes below the input's
    /// precision.
    pub precision: PrecisionPolicy,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            block_size: 32,
            scaling: ScoreScaling::None,
            precision: PrecisionPolicy::ForceF32,
        }
    }
}
