use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

use anyhow::{Context, Result};
use tracing::info;

use crate::analysis::{AnalyzerConfig, StreamAnalyzer};
use crate::cli::Replay;
use crate::protocol::{decode_sample, encode_estimate, EstimateMessage};

#[derive(Debug, Default, PartialEq)]
pub struct ReplaySummary {
    pub samples: u64,
    pub estimates: u64,
}

pub fn run_replay(replay: Replay) -> Result<()> {
    let config = AnalyzerConfig::from(&replay.analyzer);
    let mut analyzer = StreamAnalyzer::new(config).context("Invalid analyzer configuration")?;

    let input: Box<dyn BufRead> = match &replay.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = replay_lines(input, &mut analyzer, &mut out)?;
    info!(samples = summary.samples, estimates = summary.estimates, "Replay finished");
    Ok(())
}

/// Feed each JSON line to the analyzer and write one JSON line per estimate.
pub fn replay_lines<R: BufRead, W: Write>(input: R, analyzer: &mut StreamAnalyzer, out: &mut W) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();
    for (idx, line) in input.lines().enumerate() {
        let line = line.context("Reading input")?;
        if line.trim().is_empty() {
            continue;
        }
        let sample = decode_sample(&line).with_context(|| format!("Line {}", idx + 1))?;
        summary.samples += 1;
        if let Some(est) = analyzer.ingest(sample.red_value, sample.timestamp) {
            summary.estimates += 1;
            writeln!(out, "{}", encode_estimate(&EstimateMessage::from(est))?)?;
        }
    }
    out.flush()?;
    Ok(summary)
}
