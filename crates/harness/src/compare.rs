//! Element-wise output comparison.
//!
//! The closeness predicate is `|a - b| <= atol + rtol * |b|`, with `b` the
//! reference. A tolerance breach is a verdict, never an error; difference
//! statistics travel with the verdict so a mismatch can be diagnosed from
//! the report alone.

use attention::AttentionError;
use candle_core::{DType, Tensor};
use serde::Serialize;

use crate::config::HarnessError;

/// Difference statistics for one candidate-versus-reference comparison.
#[derive(Debug, Clone, Serialize)]
pub struct DiffStats {
    pub elements: usize,
    pub mismatched: usize,
    pub max_abs_diff: f32,
    pub max_rel_diff: f32,
    /// Flattened index of the first element outside tolerance.
    pub first_mismatch: Option<usize>,
}

impl DiffStats {
    pub fn within_tolerance(&self) -> bool {
        self.mismatched == 0
    }
}

/// Compare a candidate output against the reference output element-wise.
///
/// Fails with a shape mismatch when the two tensors disagree in shape; no
/// element-wise comparison is meaningful in that case.
pub fn compare(
    candidate: &Tensor,
    reference: &Tensor,
    atol: f32,
    rtol: f32,
) -> Result<DiffStats, HarnessError> {
    if candidate.dims() != reference.dims() {
        return Err(AttentionError::ShapeMismatch {
            context: format!(
                "candidate output shape {:?} does not match reference shape {:?}",
                candidate.dims(),
                reference.dims()
            ),
        }
        .into());
    }

    let candidate_vals = candidate
        .to_dtype(DType::F32)
        .map_err(AttentionError::from)?
        .flatten_all()
        .map_err(AttentionError::from)?
        .to_vec1::<f32>()
        .map_err(AttentionError::from)?;
    let reference_vals = reference
        .to_dtype(DType::F32)
        .map_err(AttentionError::from)?
        .flatten_all()
        .map_err(AttentionError::from)?
        .to_vec1::<f32>()
        .map_err(AttentionError::from)?;

    let mut stats = DiffStats {
        elements: reference_vals.len(),
        mismatched: 0,
        max_abs_diff: 0.0,
        max_rel_diff: 0.0,
        first_mismatch: None,
    };

    for (index, (&a, &b)) in candidate_vals.iter().zip(reference_vals.iter()).enumerate() {
        let abs_diff = (a - b).abs();
        stats.max_abs_diff = stats.max_abs_diff.max(abs_diff);
        stats.max_rel_diff = stats.max_rel_diff.max(abs_diff / b.abs().max(1e-5));
        let within = abs_diff <= atol + rtol * b.abs();
        if !within {
            stats.mismatched += 1;
            if stats.first_mismatch.is_none() {
                stats.first_mismatch = Some(index);
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn tensor(values: &[f32]) -> Tensor {
        Tensor::from_vec(values.to_vec(), (1, values.len(), 1), &Device::Cpu).unwrap()
    }

    #[test]
    fn identical_tensors_match_at_zero_tolerance() {
        let a = tensor(&[1.0, -2.5, 0.0, 1e-7]);
        let stats = compare(&a, &a, 0.0, 0.0).unwrap();
        assert!(stats.within_tolerance());
        assert_eq!(stats.max_abs_diff, 0.0);
        assert_eq!(stats.first_mismatch, None);
    }

    #[test]
    fn absolute_tolerance_bounds_the_verdict() {
        let reference = tensor(&[1.0, 2.0, 3.0]);
        let candidate = tensor(&[1.05, 2.0, 3.0]);
        assert!(compare(&candidate, &reference, 0.1, 0.0)
            .unwrap()
            .within_tolerance());
        let stats = compare(&candidate, &reference, 0.01, 0.0).unwrap();
        assert!(!stats.within_tolerance());
        assert_eq!(stats.mismatched, 1);
        assert_eq!(stats.first_mismatch, Some(0));
    }

    #[test]
    fn relative_tolerance_scales_with_reference_magnitude() {
        let reference = tensor(&[100.0, 0.001]);
        let candidate = tensor(&[101.0, 0.002]);
        // 1% relative slack covers the large element but not the small one.
        let stats = compare(&candidate, &reference, 0.0, 0.02).unwrap();
        assert_eq!(stats.mismatched, 1);
        assert_eq!(stats.first_mismatch, Some(1));
    }

    #[test]
    fn shape_mismatch_is_an_error_not_a_verdict() {
        let reference = tensor(&[1.0, 2.0]);
        let candidate = tensor(&[1.0, 2.0, 3.0]);
        let err = compare(&candidate, &reference, 0.1, 0.0).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Attention(AttentionError::ShapeMismatch { .. })
        ));
    }
}
