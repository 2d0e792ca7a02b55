//! Equivalence and benchmark harness for block-sparse attention kernels.
//!
//! The harness drives the exact reference engine and one or more candidate
//! kernels with bit-identical inputs, compares every candidate's output to
//! the cached reference output under configurable tolerances, and reports a
//! per-candidate verdict with timing. Candidates are isolated: a failing or
//! panicking candidate is reported and the run continues with the next one.
//!
//! The protocol is strictly sequential on a single control thread, so timing
//! is never skewed by resource contention between candidates.

pub mod compare;
pub mod config;
pub mod inputs;
pub mod registry;
pub mod report;
pub mod runner;

pub use compare::{compare, DiffStats};
pub use config::{CandidateExecutionFailure, HarnessConfig, HarnessError, ReportOptions};
pub use registry::{Candidate, CandidateRegistry};
pub use report::{CandidateReport, RunReport, TimingSpan, Verdict};
pub use runner::{run, run_and_report};
