use std::fs;

use anyhow::Result;
use attention::{AttentionError, BlockSparseAttention, ExactBlockSparse, KernelConfig};
use candle_core::Tensor;
use harness::{
    run, CandidateRegistry, HarnessConfig, HarnessError, Verdict,
};
use tempfile::tempdir;

/// Recomputes the reference algorithm; on identical inputs its output is
/// bit-identical to the harness's own reference run.
struct Echo(ExactBlockSparse);

impl BlockSparseAttention for Echo {
    fn forward(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        block_indices: &Tensor,
        config: &KernelConfig,
    ) -> Result<Tensor, AttentionError> {
        self.0.forward(q, k, v, block_indices, config)
    }
}

struct AllZeros;

impl BlockSparseAttention for AllZeros {
    fn forward(
        &self,
        _q: &Tensor,
        _k: &Tensor,
        v: &Tensor,
        _block_indices: &Tensor,
        _config: &KernelConfig,
    ) -> Result<Tensor, AttentionError> {
        Ok(v.zeros_like()?)
    }
}

struct AlwaysFails;

impl BlockSparseAttention for AlwaysFails {
    fn forward(
        &self,
        _q: &Tensor,
        _k: &Tensor,
        _v: &Tensor,
        _block_indices: &Tensor,
        _config: &KernelConfig,
    ) -> Result<Tensor, AttentionError> {
        Err(AttentionError::Unsupported(
            "simulated device failure".to_string(),
        ))
    }
}

struct Panics;

impl BlockSparseAttention for Panics {
    fn forward(
        &self,
        _q: &Tensor,
        _k: &Tensor,
        _v: &Tensor,
        _block_indices: &Tensor,
        _config: &KernelConfig,
    ) -> Result<Tensor, AttentionError> {
        panic!("simulated kernel crash");
    }
}

struct WrongShape;

impl BlockSparseAttention for WrongShape {
    fn forward(
        &self,
        _q: &Tensor,
        _k: &Tensor,
        v: &Tensor,
        _block_indices: &Tensor,
        _config: &KernelConfig,
    ) -> Result<Tensor, AttentionError> {
        Ok(v.narrow(1, 0, 1)?)
    }
}

fn small_config(candidates: &[&str]) -> HarnessConfig {
    HarnessConfig {
        batch_size: 2,
        seq_len: 128,
        feature_dim: 16,
        candidates: candidates.iter().map(|s| s.to_string()).collect(),
        ..HarnessConfig::default()
    }
}

#[test]
fn echo_candidate_matches_exactly_on_the_canonical_scenario() -> Result<()> {
    // B=8, T=1024, D=64, block_size=32, blocks_per_query=2, seed=42; exact
    // equality validates the comparison machinery itself.
    let config = HarnessConfig {
        atol: 0.0,
        rtol: 0.0,
        candidates: vec!["echo".to_string()],
        ..HarnessConfig::default()
    };
    let mut registry = CandidateRegistry::new();
    registry.register("echo", Box::new(Echo(ExactBlockSparse::new())))?;

    let report = run(&config, &registry)?;
    assert_eq!(report.candidates.len(), 1);
    let row = &report.candidates[0];
    assert_eq!(row.verdict, Verdict::Match);
    let stats = row.stats.as_ref().expect("stats present");
    assert_eq!(stats.elements, 8 * 1024 * 64);
    assert_eq!(stats.max_abs_diff, 0.0);
    Ok(())
}

#[test]
fn fused_builtin_matches_the_reference() -> Result<()> {
    let config = small_config(&["fused"]);
    let registry = CandidateRegistry::with_builtins();
    let report = run(&config, &registry)?;
    assert!(report.all_match());
    let stats = report.candidates[0].stats.as_ref().unwrap();
    assert!(stats.max_abs_diff < 1e-4);
    Ok(())
}

#[test]
fn zeros_candidate_is_reported_as_mismatch() -> Result<()> {
    let config = small_config(&["zeros"]);
    let mut registry = CandidateRegistry::new();
    registry.register("zeros", Box::new(AllZeros))?;

    let report = run(&config, &registry)?;
    let row = &report.candidates[0];
    assert_eq!(row.verdict, Verdict::Mismatch);
    let stats = row.stats.as_ref().unwrap();
    assert!(stats.mismatched > 0);
    assert!(stats.max_abs_diff > 0.1);
    assert!(!report.all_match());
    Ok(())
}

#[test]
fn failing_candidate_does_not_abort_later_candidates() -> Result<()> {
    let config = small_config(&["broken", "echo"]);
    let mut registry = CandidateRegistry::new();
    registry.register("broken", Box::new(AlwaysFails))?;
    registry.register("echo", Box::new(Echo(ExactBlockSparse::new())))?;

    let report = run(&config, &registry)?;
    assert_eq!(report.candidates.len(), 2);
    assert_eq!(report.candidates[0].verdict, Verdict::Failed);
    let error = report.candidates[0].error.as_deref().unwrap();
    assert!(error.contains("broken"));
    assert!(error.contains("simulated device failure"));
    assert_eq!(report.candidates[1].verdict, Verdict::Match);
    Ok(())
}

#[test]
fn panicking_candidate_is_contained() -> Result<()> {
    let config = small_config(&["crashy", "echo"]);
    let mut registry = CandidateRegistry::new();
    registry.register("crashy", Box::new(Panics))?;
    registry.register("echo", Box::new(Echo(ExactBlockSparse::new())))?;

    let report = run(&config, &registry)?;
    assert_eq!(report.candidates[0].verdict, Verdict::Failed);
    assert!(report.candidates[0]
        .error
        .as_deref()
        .unwrap()
        .contains("simulated kernel crash"));
    assert_eq!(report.candidates[1].verdict, Verdict::Match);
    Ok(())
}

#[test]
fn wrong_output_shape_is_a_failure_not_a_mismatch() -> Result<()> {
    let config = small_config(&["truncated"]);
    let mut registry = CandidateRegistry::new();
    registry.register("truncated", Box::new(WrongShape))?;

    let report = run(&config, &registry)?;
    let row = &report.candidates[0];
    assert_eq!(row.verdict, Verdict::Failed);
    assert!(row.error.as_deref().unwrap().contains("shape"));
    Ok(())
}

#[test]
fn repeated_runs_with_one_seed_are_deterministic() -> Result<()> {
    let config = small_config(&["echo"]);
    let mut registry = CandidateRegistry::new();
    registry.register("echo", Box::new(Echo(ExactBlockSparse::new())))?;

    let first = run(&config, &registry)?;
    let second = run(&config, &registry)?;
    let a = first.candidates[0].stats.as_ref().unwrap();
    let b = second.candidates[0].stats.as_ref().unwrap();
    assert_eq!(a.max_abs_diff, 0.0);
    assert_eq!(b.max_abs_diff, 0.0);
    assert_eq!(a.elements, b.elements);
    Ok(())
}

#[test]
fn unknown_candidate_name_is_rejected_before_any_compute() {
    let config = small_config(&["missing"]);
    let registry = CandidateRegistry::with_builtins();
    let err = run(&config, &registry).unwrap_err();
    assert!(matches!(err, HarnessError::Validation(_)));
}

#[test]
fn config_round_trips_through_toml_and_json() -> Result<()> {
    let dir = tempdir()?;

    let toml_path = dir.path().join("validate.toml");
    fs::write(
        &toml_path,
        r#"
batch_size = 4
seq_len = 256
feature_dim = 32
block_size = 64
blocks_per_query = 2
seed = 7
atol = 0.05
scaling = "inv_sqrt_dim"

[report]
preview_elements = 4
"#,
    )?;
    let config = HarnessConfig::from_path(&toml_path)?;
    assert_eq!(config.batch_size, 4);
    assert_eq!(config.seq_len, 256);
    assert_eq!(config.block_size, 64);
    assert_eq!(config.seed, 7);
    assert_eq!(config.atol, 0.05);
    assert_eq!(config.scaling, "inv_sqrt_dim");
    assert_eq!(config.report.preview_elements, 4);
    // Unspecified fields keep their defaults.
    assert_eq!(config.rtol, 0.0);
    assert_eq!(config.candidates, vec!["fused".to_string()]);

    let json_path = dir.path().join("validate.json");
    fs::write(&json_path, r#"{"seq_len": 512, "blocks_per_query": 3}"#)?;
    let config = HarnessConfig::from_path(&json_path)?;
    assert_eq!(config.seq_len, 512);
    assert_eq!(config.blocks_per_query, 3);

    let bad_path = dir.path().join("validate.yaml");
    fs::write(&bad_path, "seq_len: 512")?;
    assert!(matches!(
        HarnessConfig::from_path(&bad_path),
        Err(HarnessError::ConfigFormat(_))
    ));
    Ok(())
}

#[test]
fn invalid_config_file_reports_every_violation() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("broken.toml");
    fs::write(
        &path,
        r#"
seq_len = 64
block_size = 32
blocks_per_query = 5
atol = -1.0
device = "tpu"
"#,
    )?;
    match HarnessConfig::from_path(&path) {
        Err(HarnessError::Validation(messages)) => assert_eq!(messages.len(), 3),
        other => panic!("expected validation failure, got {other:?}"),
    }
    Ok(())
}

#[test]
fn json_report_is_written_when_configured() -> Result<()> {
    let dir = tempdir()?;
    let json_path = dir.path().join("report.json");

    let config = small_config(&["fused"]);
    let registry = CandidateRegistry::with_builtins();
    let report = run(&config, &registry)?;
    report.write_json(&json_path)?;

    let contents = fs::read_to_string(&json_path)?;
    assert!(contents.contains("\"fused\""));
    assert!(contents.contains("reference_secs"));
    Ok(())
}
