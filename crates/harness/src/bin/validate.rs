use std::path::PathBuf;

use clap::Parser;
use harness::{run_and_report, HarnessConfig, HarnessError};

fn main() {
    env_logger::init();
    match run() {
        Ok(all_match) => {
            if !all_match {
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("validation failed: {}", err);
            std::process::exit(1);
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Block-sparse attention kernel validation", long_about = None)]
struct Args {
    #[arg(
        short,
        long,
        value_name = "PATH",
        help = "Path to a TOML or JSON config; defaults apply when omitted"
    )]
    config: Option<PathBuf>,

    #[arg(long, help = "Override the RNG seed")]
    seed: Option<u64>,

    #[arg(long, help = "Override the absolute tolerance")]
    atol: Option<f32>,

    #[arg(long, help = "Override the relative tolerance")]
    rtol: Option<f32>,

    #[arg(long, help = "Override the compute target, e.g. cpu or cuda:0")]
    device: Option<String>,

    #[arg(
        long,
        value_name = "NAMES",
        value_delimiter = ',',
        help = "Comma-separated candidate names to evaluate"
    )]
    candidates: Option<Vec<String>>,

    #[arg(long, value_name = "PATH", help = "Write a JSON copy of the report")]
    json: Option<PathBuf>,
}

fn run() -> Result<bool, HarnessError> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => HarnessConfig::from_path(path)?,
        None => HarnessConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(atol) = args.atol {
        config.atol = atol;
    }
    if let Some(rtol) = args.rtol {
        config.rtol = rtol;
    }
    if let Some(device) = args.device {
        config.device = device;
    }
    if let Some(candidates) = args.candidates {
        config.candidates = candidates;
    }
    if let Some(json) = args.json {
        config.report.json_path = Some(json);
    }
    config.validate()?;

    let report = run_and_report(&config)?;
    Ok(report.all_match())
}
