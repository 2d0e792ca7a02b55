//! Harness configuration.
//!
//! Loaded from TOML or JSON by file extension; every field has a default
//! mirroring the canonical validation scenario (B=8, T=1024, D=64, block
//! size 32, two blocks per query, seed 42, atol 1e-1). Validation collects
//! every violation before reporting, so a bad file is fixed in one pass.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use attention::{AttentionError, KernelConfig, PrecisionPolicy, ScoreScaling};
use candle_core::Device;
use serde::Deserialize;
use thiserror::Error;

/// Full configuration for one validation/benchmark run.
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessConfig {
    /// Number of independent sequences (B).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Sequence length (T).
    #[serde(default = "default_seq_len")]
    pub seq_len: usize,
    /// Feature dimension (D).
    #[serde(default = "default_feature_dim")]
    pub feature_dim: usize,
    /// Sequence positions per block.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Key/value blocks attended per query block.
    #[serde(default = "default_blocks_per_query")]
    pub blocks_per_query: usize,
    /// RNG seed for input generation.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Absolute comparison tolerance.
    #[serde(default = "default_atol")]
    pub atol: f32,
    /// Relative comparison tolerance.
    #[serde(default = "default_rtol")]
    pub rtol: f32,
    /// Compute target: `cpu`, `cuda:N`, or `metal:N`.
    #[serde(default = "default_device")]
    pub device: String,
    /// Score scaling: `none` or `inv_sqrt_dim`.
    #[serde(default = "default_scaling")]
    pub scaling: String,
    /// Working precision: `force_f32` or `inherit`.
    #[serde(default = "default_precision")]
    pub precision: String,
    /// Candidates to evaluate, in order.
    #[serde(default = "default_candidates")]
    pub candidates: Vec<String>,
    #[serde(default)]
    pub report: ReportOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportOptions {
    /// Leading elements of each flattened output logged as a preview.
    #[serde(default = "default_preview_elements")]
    pub preview_elements: usize,
    /// Number of timing spans shown in the breakdown.
    #[serde(default = "default_timing_top_n")]
    pub timing_top_n: usize,
    /// Optional path for a JSON copy of the report.
    #[serde(default)]
    pub json_path: Option<PathBuf>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            preview_elements: default_preview_elements(),
            timing_top_n: default_timing_top_n(),
            json_path: None,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            seq_len: default_seq_len(),
            feature_dim: default_feature_dim(),
            block_size: default_block_size(),
            blocks_per_query: default_blocks_per_query(),
            seed: default_seed(),
            atol: default_atol(),
            rtol: default_rtol(),
            device: default_device(),
            scaling: default_scaling(),
            precision: default_precision(),
            candidates: default_candidates(),
            report: ReportOptions::default(),
        }
    }
}

impl HarnessConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: HarnessConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)
                .map_err(|err| HarnessError::ConfigFormat(err.to_string()))?,
            Some("toml") | Some("tml") | None => toml::from_str(&contents)
                .map_err(|err| HarnessError::ConfigFormat(err.to_string()))?,
            Some(other) => {
                return Err(HarnessError::ConfigFormat(format!(
                    "unsupported configuration extension '{}'",
                    other
                )));
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Collect every violation before reporting.
    pub fn validate(&self) -> Result<(), HarnessError> {
        let mut errors = Vec::new();

        if self.batch_size == 0 {
            errors.push("batch_size must be greater than 0".to_string());
        }
        if self.seq_len == 0 {
            errors.push("seq_len must be greater than 0".to_string());
        }
        if self.feature_dim == 0 {
            errors.push("feature_dim must be greater than 0".to_string());
        }
        if self.block_size == 0 {
            errors.push("block_size must be greater than 0".to_string());
        }
        if self.blocks_per_query == 0 {
            errors.push("blocks_per_query must be greater than 0".to_string());
        } else if self.block_size > 0 && self.seq_len > 0 {
            let num_blocks = (self.seq_len + self.block_size - 1) / self.block_size;
            if self.blocks_per_query > num_blocks {
                errors.push(format!(
                    "blocks_per_query {} exceeds the {} available blocks",
                    self.blocks_per_query, num_blocks
                ));
            }
        }
        if self.atol < 0.0 {
            errors.push("atol must be >= 0".to_string());
        }
        if self.rtol < 0.0 {
            errors.push("rtol must be >= 0".to_string());
        }
        if self.candidates.is_empty() {
            errors.push("candidates must not be empty".to_string());
        }
        if let Err(message) = parse_scaling(&self.scaling) {
            errors.push(message);
        }
        if let Err(message) = parse_precision(&self.precision) {
            errors.push(message);
        }
        if let Err(message) = check_device(&self.device) {
            errors.push(message);
        }
        if self.report.preview_elements == 0 {
            errors.push("report.preview_elements must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::Validation(errors))
        }
    }

    /// Number of query blocks implied by `seq_len` and `block_size`.
    pub fn num_query_blocks(&self) -> usize {
        (self.seq_len + self.block_size - 1) / self.block_size
    }

    /// The kernel configuration shared by the reference and every candidate.
    pub fn kernel_config(&self) -> Result<KernelConfig, HarnessError> {
        Ok(KernelConfig {
            block_size: self.block_size,
            scaling: parse_scaling(&self.scaling).map_err(|m| HarnessError::Validation(vec![m]))?,
            precision: parse_precision(&self.precision)
                .map_err(|m| HarnessError::Validation(vec![m]))?,
        })
    }

    /// Resolve the configured compute target.
    pub fn resolve_device(&self) -> Result<Device, HarnessError> {
        let (kind, ordinal) = split_device(&self.device);
        match kind {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Device::new_cuda(ordinal).map_err(AttentionError::from).map_err(Into::into),
            "metal" => Device::new_metal(ordinal)
                .map_err(AttentionError::from)
                .map_err(Into::into),
            other => Err(HarnessError::Validation(vec![format!(
                "unsupported device '{}'",
                other
            )])),
        }
    }
}

fn split_device(value: &str) -> (&str, usize) {
    match value.split_once(':') {
        Some((kind, ordinal)) => (kind, ordinal.parse().unwrap_or(0)),
        None => (value, 0),
    }
}

fn check_device(value: &str) -> Result<(), String> {
    let (kind, _) = split_device(value);
    match kind {
        "cpu" | "cuda" | "metal" => Ok(()),
        other => Err(format!("unsupported device '{}'", other)),
    }
}

fn parse_scaling(value: &str) -> Result<ScoreScaling, String> {
    match value.to_ascii_lowercase().as_str() {
        "none" | "off" | "raw" => Ok(ScoreScaling::None),
        "inv_sqrt_dim" | "sqrt" | "conventional" => Ok(ScoreScaling::InverseSqrtDim),
        other => Err(format!("unsupported scaling '{}'", other)),
    }
}

fn parse_precision(value: &str) -> Result<PrecisionPolicy, String> {
    match value.to_ascii_lowercase().as_str() {
        "force_f32" | "f32" | "full" => Ok(PrecisionPolicy::ForceF32),
        "inherit" => Ok(PrecisionPolicy::Inherit),
        other => Err(format!("unsupported precision '{}'", other)),
    }
}

fn default_batch_size() -> usize {
    8
}

fn default_seq_len() -> usize {
    1024
}

fn default_feature_dim() -> usize {
    64
}

fn default_block_size() -> usize {
    32
}

fn default_blocks_per_query() -> usize {
    2
}

fn default_seed() -> u64 {
    42
}

fn default_atol() -> f32 {
    1e-1
}

fn default_rtol() -> f32 {
    0.0
}

fn default_device() -> String {
    "cpu".to_string()
}

fn default_scaling() -> String {
    "none".to_string()
}

fn default_precision() -> String {
    "force_f32".to_string()
}

fn default_candidates() -> Vec<String> {
    vec!["fused".to_string()]
}

fn default_preview_elements() -> usize {
    10
}

fn default_timing_top_n() -> usize {
    5
}

/// Errors raised by the harness outside candidate execution.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ConfigFormat(String),

    #[error("invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error(transparent)]
    Attention(#[from] AttentionError),

    #[error("failed to write report: {0}")]
    Report(#[from] serde_json::Error),
}

/// A specific candidate failed to execute; isolated to that candidate.
#[derive(Debug)]
pub struct CandidateExecutionFailure {
    pub name: String,
    pub message: String,
}

impl fmt::Display for CandidateExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "candidate '{}' failed: {}", self.name, self.message)
    }
}

impl std::error::Error for CandidateExecutionFailure {}
