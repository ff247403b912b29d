use serde::{Deserialize, Serialize};
use tracing::trace;

use super::buffer::SampleBuffer;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Good,
    /// Reserved for estimates outside the plausible range. The estimator
    /// discards such values, so nothing produces this today.
    Poor,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HeartRateEstimate {
    /// Beats per minute, rounded to one decimal place.
    pub bpm: f64,
    pub quality: Quality,
}

/// Turns a peak count over a time span into a plausibility-checked BPM value.
#[derive(Copy, Clone, Debug)]
pub struct RateEstimator {
    min_samples: usize,
    min_bpm: f64,
    max_bpm: f64,
}

impl RateEstimator {
    pub fn new(min_samples: usize, min_bpm: f64, max_bpm: f64) -> Self {
        Self { min_samples, min_bpm, max_bpm }
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Estimate from peaks found in `buffer`, using the full window span as
    /// elapsed time.
    pub fn estimate_window(&self, buffer: &SampleBuffer, peak_count: usize) -> Option<HeartRateEstimate> {
        if buffer.len() < self.min_samples {
            trace!(len = buffer.len(), "not enough samples");
            return None;
        }
        self.estimate(peak_count, buffer.elapsed()?)
    }

    pub fn estimate(&self, peak_count: usize, elapsed_seconds: f64) -> Option<HeartRateEstimate> {
        if peak_count < 2 {
            trace!(peak_count, "too few peaks");
            return None;
        }
        if !elapsed_seconds.is_finite() || elapsed_seconds <= 0.0 {
            trace!(elapsed_seconds, "degenerate time span");
            return None;
        }
        let bpm = peak_count as f64 / elapsed_seconds * 60.0;
        if !self.is_plausible(bpm) {
            trace!(bpm, "implausible rate discarded");
            return None;
        }
        Some(HeartRateEstimate {
            bpm: round_tenths(bpm),
            quality: self.classify(bpm),
        })
    }

    pub fn is_plausible(&self, bpm: f64) -> bool {
        (self.min_bpm..=self.max_bpm).contains(&bpm)
    }

    fn classify(&self, bpm: f64) -> Quality {
        if self.is_plausible(bpm) {
            Quality::Good
        } else {
            Quality::Poor
        }
    }
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new(super::DEFAULT_MIN_SAMPLES, super::DEFAULT_MIN_BPM, super::DEFAULT_MAX_BPM)
    }
}

/// Round to one decimal on the exact value, ties to even.
fn round_tenths(v: f64) -> f64 {
    format!("{v:.1}").parse().unwrap_or(v)
}
