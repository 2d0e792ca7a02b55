//! The validation protocol.
//!
//! One run: seed the generator, build the inputs once, run the reference
//! once, then evaluate every configured candidate sequentially against the
//! same cached reference output. A candidate failure (error or panic) is
//! downgraded to a FAILED row and never aborts the remaining candidates.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use attention::{BlockLayout, BlockSparseAttention, ExactBlockSparse};
use candle_core::{DType, Tensor};
use rand::{rngs::StdRng, SeedableRng};

use crate::config::{CandidateExecutionFailure, HarnessConfig, HarnessError};
use crate::inputs;
use crate::registry::CandidateRegistry;
use crate::report::{CandidateReport, RunReport, TimingSpan, Verdict};
use crate::{compare, report};

/// Execute the full equivalence/benchmark protocol for one configuration.
pub fn run(
    config: &HarnessConfig,
    registry: &CandidateRegistry,
) -> Result<RunReport, HarnessError> {
    config.validate()?;
    let candidates = registry.select(&config.candidates)?;
    let device = config.resolve_device()?;
    let kernel_config = config.kernel_config()?;
    let layout = BlockLayout::new(config.seq_len, config.block_size)?;

    log::info!(
        "validation run: batch={} seq_len={} feature_dim={} block_size={} blocks_per_query={} \
         seed={} atol={} rtol={} device={} candidates=[{}]",
        config.batch_size,
        config.seq_len,
        config.feature_dim,
        config.block_size,
        config.blocks_per_query,
        config.seed,
        config.atol,
        config.rtol,
        config.device,
        config.candidates.join(", ")
    );

    let mut spans = Vec::new();
    let mut rng = StdRng::seed_from_u64(config.seed);

    let started = Instant::now();
    let (q, k, v) = inputs::generate_qkv(
        &mut rng,
        config.batch_size,
        config.seq_len,
        config.feature_dim,
        &device,
    )?;
    let block_indices = inputs::generate_assignment(
        &mut rng,
        config.batch_size,
        &layout,
        config.blocks_per_query,
        &device,
    )?;
    spans.push(TimingSpan {
        name: "input generation".to_string(),
        elapsed_secs: started.elapsed().as_secs_f64(),
    });

    // The reference runs exactly once; its output is the single ground truth
    // for every candidate in this run.
    let reference_engine = ExactBlockSparse::new();
    let started = Instant::now();
    let reference_out = reference_engine.forward(&q, &k, &v, &block_indices, &kernel_config)?;
    let reference_secs = started.elapsed().as_secs_f64();
    spans.push(TimingSpan {
        name: "reference".to_string(),
        elapsed_secs: reference_secs,
    });
    log_preview("reference", &reference_out, config.report.preview_elements);

    let mut rows = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            candidate
                .kernel()
                .forward(&q, &k, &v, &block_indices, &kernel_config)
        }));
        let elapsed_secs = started.elapsed().as_secs_f64();
        spans.push(TimingSpan {
            name: format!("candidate '{}'", candidate.name()),
            elapsed_secs,
        });

        let row = match outcome {
            Err(payload) => failed_row(candidate.name(), panic_message(payload.as_ref())),
            Ok(Err(err)) => failed_row(candidate.name(), err.to_string()),
            Ok(Ok(output)) => {
                log_preview(candidate.name(), &output, config.report.preview_elements);
                match compare::compare(&output, &reference_out, config.atol, config.rtol) {
                    Err(HarnessError::Attention(err)) => {
                        failed_row(candidate.name(), err.to_string())
                    }
                    Err(err) => return Err(err),
                    Ok(stats) => {
                        let verdict = if stats.within_tolerance() {
                            Verdict::Match
                        } else {
                            Verdict::Mismatch
                        };
                        log::info!(
                            "candidate '{}' verdict={} max_abs_diff={:.3e} elapsed={:.3}s",
                            candidate.name(),
                            verdict,
                            stats.max_abs_diff,
                            elapsed_secs
                        );
                        CandidateReport {
                            name: candidate.name().to_string(),
                            verdict,
                            elapsed_secs: Some(elapsed_secs),
                            speedup: Some(reference_secs / elapsed_secs),
                            stats: Some(stats),
                            error: None,
                        }
                    }
                }
            }
        };
        rows.push(row);
    }

    Ok(RunReport {
        reference_secs,
        candidates: rows,
        spans,
    })
}

/// Run with the builtin registry, render to stdout, and return the report.
pub fn run_and_report(config: &HarnessConfig) -> Result<RunReport, HarnessError> {
    let registry = CandidateRegistry::with_builtins();
    let run_report = run(config, &registry)?;
    println!("{}", run_report.render(config.report.timing_top_n));
    if let Some(path) = &config.report.json_path {
        run_report.write_json(path)?;
        log::info!("json report written to {}", path.display());
    }
    Ok(run_report)
}

fn failed_row(name: &str, message: String) -> CandidateReport {
    let failure = CandidateExecutionFailure {
        name: name.to_string(),
        message,
    };
    log::warn!("{failure}");
    CandidateReport {
        name: name.to_string(),
        verdict: report::Verdict::Failed,
        elapsed_secs: None,
        speedup: None,
        stats: None,
        error: Some(failure.to_string()),
    }
}

fn log_preview(name: &str, output: &Tensor, elements: usize) {
    let preview = output
        .to_dtype(DType::F32)
        .and_then(|t| t.flatten_all())
        .and_then(|t| {
            let len = t.dims1()?.min(elements);
            t.narrow(0, 0, len)
        })
        .and_then(|t| t.to_vec1::<f32>());
    match preview {
        Ok(values) => log::info!("{name} output preview: {values:?}"),
        Err(err) => log::warn!("{name} output preview unavailable: {err}"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}
