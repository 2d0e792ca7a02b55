//! Run report model and rendering.
//!
//! One report per run: the reference timing, a row per candidate with its
//! verdict and difference statistics, and a per-stage timing breakdown. The
//! rendered format is informational only; the JSON dump is for tooling.

use std::{fmt, fs, path::Path};

use serde::Serialize;

use crate::compare::DiffStats;
use crate::config::HarnessError;

/// Outcome of one candidate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Match,
    Mismatch,
    Failed,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Match => f.write_str("MATCH"),
            Verdict::Mismatch => f.write_str("MISMATCH"),
            Verdict::Failed => f.write_str("FAILED"),
        }
    }
}

/// Result row for one candidate.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateReport {
    pub name: String,
    pub verdict: Verdict,
    /// Candidate wall-clock time; absent when the candidate never ran to
    /// completion.
    pub elapsed_secs: Option<f64>,
    /// Reference time divided by candidate time.
    pub speedup: Option<f64>,
    pub stats: Option<DiffStats>,
    pub error: Option<String>,
}

/// A named, timed stage of the run.
#[derive(Debug, Clone, Serialize)]
pub struct TimingSpan {
    pub name: String,
    pub elapsed_secs: f64,
}

/// Full result of one validation/benchmark run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub reference_secs: f64,
    pub candidates: Vec<CandidateReport>,
    pub spans: Vec<TimingSpan>,
}

impl RunReport {
    /// True when every candidate reported MATCH.
    pub fn all_match(&self) -> bool {
        self.candidates
            .iter()
            .all(|candidate| candidate.verdict == Verdict::Match)
    }

    /// Render the per-candidate lines, summary table, and top-N timing
    /// breakdown.
    pub fn render(&self, timing_top_n: usize) -> String {
        let mut out = String::new();

        for candidate in &self.candidates {
            match candidate.verdict {
                Verdict::Failed => {
                    out.push_str(&format!(
                        "{}: FAILED ({})\n",
                        candidate.name,
                        candidate.error.as_deref().unwrap_or("unknown error")
                    ));
                }
                verdict => {
                    out.push_str(&format!(
                        "{}: {} reference={} candidate={} speedup={}\n",
                        candidate.name,
                        verdict,
                        format_secs(self.reference_secs),
                        candidate
                            .elapsed_secs
                            .map(format_secs)
                            .unwrap_or_else(|| "-".to_string()),
                        candidate
                            .speedup
                            .map(|s| format!("{s:.2}x"))
                            .unwrap_or_else(|| "-".to_string()),
                    ));
                }
            }
        }

        let rows: Vec<Vec<String>> = self
            .candidates
            .iter()
            .map(|candidate| {
                vec![
                    candidate.name.clone(),
                    candidate.verdict.to_string(),
                    candidate
                        .elapsed_secs
                        .map(format_secs)
                        .unwrap_or_else(|| "-".to_string()),
                    candidate
                        .speedup
                        .map(|s| format!("{s:.2}x"))
                        .unwrap_or_else(|| "-".to_string()),
                    candidate
                        .stats
                        .as_ref()
                        .map(|stats| format!("{:.3e}", stats.max_abs_diff))
                        .unwrap_or_else(|| "-".to_string()),
                ]
            })
            .collect();
        out.push('\n');
        out.push_str(&format_markdown_table(
            &["candidate", "verdict", "time", "speedup", "max abs diff"],
            &rows,
        ));

        let mut spans = self.spans.clone();
        spans.sort_by(|a, b| b.elapsed_secs.total_cmp(&a.elapsed_secs));
        out.push_str("\ntop time-consuming stages:\n");
        for span in spans.iter().take(timing_top_n) {
            out.push_str(&format!("  {:<24} {}\n", span.name, format_secs(span.elapsed_secs)));
        }

        out
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), HarnessError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn format_markdown_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut table = String::new();
    table.push_str("| ");
    table.push_str(&headers.join(" | "));
    table.push_str(" |\n| ");
    table.push_str(&headers.iter().map(|_| "---").collect::<Vec<_>>().join(" | "));
    table.push_str(" |\n");
    for row in rows {
        table.push_str("| ");
        table.push_str(&row.join(" | "));
        table.push_str(" |\n");
    }
    table
}

fn format_secs(secs: f64) -> String {
    if secs >= 1.0 {
        format!("{secs:.3}s")
    } else if secs >= 1e-3 {
        format!("{:.3}ms", secs * 1e3)
    } else {
        format!("{:.1}us", secs * 1e6)
    }
}
