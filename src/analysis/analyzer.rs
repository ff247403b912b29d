use thiserror::Error;

use super::buffer::{Sample, SampleBuffer};
use super::peaks::detect_peaks;
use super::rate::{HeartRateEstimate, RateEstimator};
use super::smoother::Smoother;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("buffer capacity must be at least 1")]
    ZeroCapacity,
    #[error("smoothing window must be at least 1")]
    ZeroWindow,
    #[error("min samples ({min_samples}) must be between 2 and the buffer capacity ({capacity})")]
    MinSamplesOutOfRange { min_samples: usize, capacity: usize },
    #[error("invalid bpm range {min}..={max}")]
    InvalidBpmRange { min: f64, max: f64 },
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AnalyzerConfig {
    pub capacity: usize,
    pub min_samples: usize,
    pub smoothing_window: usize,
    pub min_bpm: f64,
    pub max_bpm: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            capacity: super::DEFAULT_CAPACITY,
            min_samples: super::DEFAULT_MIN_SAMPLES,
            smoothing_window: super::DEFAULT_SMOOTHING_WINDOW,
            min_bpm: super::DEFAULT_MIN_BPM,
            max_bpm: super::DEFAULT_MAX_BPM,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.smoothing_window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.min_samples < 2 || self.min_samples > self.capacity {
            return Err(ConfigError::MinSamplesOutOfRange {
                min_samples: self.min_samples,
                capacity: self.capacity,
            });
        }
        if !self.min_bpm.is_finite() || !self.max_bpm.is_finite() || self.min_bpm > self.max_bpm {
            return Err(ConfigError::InvalidBpmRange {
                min: self.min_bpm,
                max: self.max_bpm,
            });
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Accumulating,
    Estimating,
}

/// Per-stream pipeline. Owns its window; one instance per connection.
///
/// Every ingested sample re-runs smoothing and peak detection over the whole
/// window.
#[derive(Debug, Clone)]
pub struct StreamAnalyzer {
    buffer: SampleBuffer,
    smoother: Smoother,
    estimator: RateEstimator,
}

impl StreamAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            buffer: SampleBuffer::new(config.capacity),
            smoother: Smoother::new(config.smoothing_window),
            estimator: RateEstimator::new(config.min_samples, config.min_bpm, config.max_bpm),
        })
    }

    pub fn ingest(&mut self, value: f64, timestamp: f64) -> Option<HeartRateEstimate> {
        self.buffer.append(Sample::new(value, timestamp));
        if self.phase() == Phase::Accumulating {
            return None;
        }
        let smoothed = self.smoother.smooth(&self.buffer.values());
        let peaks = detect_peaks(&smoothed);
        self.estimator.estimate_window(&self.buffer, peaks.len())
    }

    pub fn phase(&self) -> Phase {
        if self.buffer.len() < self.estimator.min_samples() {
            Phase::Accumulating
        } else {
            Phase::Estimating
        }
    }

    #[cfg(test)]
    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }
}

impl Default for StreamAnalyzer {
    fn default() -> Self {
        Self {
            buffer: SampleBuffer::new(super::DEFAULT_CAPACITY),
            smoother: Smoother::default(),
            estimator: RateEstimator::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Quality;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const RATE: f64 = 30.0;

    fn sine(bpm: f64, i: usize) -> f64 {
        let t = i as f64 / RATE;
        10.0 * (2.0 * std::f64::consts::PI * bpm / 60.0 * t).sin()
    }

    #[test]
    fn silent_until_min_samples() {
        let mut an = StreamAnalyzer::default();
        for i in 0..99 {
            assert_eq!(an.ingest(sine(72.0, i), i as f64 / RATE), None);
            assert_eq!(an.phase(), Phase::Accumulating);
        }
        an.ingest(sine(72.0, 99), 99.0 / RATE);
        assert_eq!(an.phase(), Phase::Estimating);
    }

    #[test]
    fn tracks_72_bpm_sine() {
        let mut an = StreamAnalyzer::default();
        let results: Vec<Option<HeartRateEstimate>> =
            (0..300).map(|i| an.ingest(sine(72.0, i), i as f64 / RATE)).collect();

        assert!(results[..99].iter().all(Option::is_none));
        let first = results[99].expect("estimate at the 100th sample");
        assert!((first.bpm - 72.0).abs() <= 3.0, "first {}", first.bpm);
        assert_eq!(first.quality, Quality::Good);

        let last = results[299].expect("estimate with a full window");
        assert!((last.bpm - 72.0).abs() <= 3.0, "last {}", last.bpm);
        assert_eq!(last.quality, Quality::Good);

        for est in results.iter().flatten() {
            assert!((40.0..=200.0).contains(&est.bpm));
            assert_eq!(est.quality, Quality::Good);
        }
        assert_eq!(an.buffer().len(), 300);
    }

    #[test]
    fn noise_never_yields_implausible_values() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut an = StreamAnalyzer::default();
        let mut silent = 0;
        for i in 0..300 {
            match an.ingest(rng.gen_range(0.0..1.0), i as f64 / RATE) {
                Some(est) => assert!((40.0..=200.0).contains(&est.bpm), "{}", est.bpm),
                None => silent += 1,
            }
        }
        assert!(silent >= 99, "only {silent} silent samples");
    }

    fn triangle(i: usize) -> f64 {
        ((i % 10) as f64 - 5.0).abs()
    }

    #[test]
    fn rate_above_gate_is_silent() {
        // 10 peaks in 100 samples; stretch the timeline to 2.4 s => 250 bpm
        let dt = 2.4 / 99.0;
        let mut an = StreamAnalyzer::default();
        let mut last = None;
        for i in 0..100 {
            last = an.ingest(triangle(i), i as f64 * dt);
        }
        assert_eq!(an.phase(), Phase::Estimating);
        assert_eq!(last, None);
    }

    #[test]
    fn same_waveform_within_gate_is_reported() {
        // same 10 peaks over 6 s => 100 bpm
        let dt = 6.0 / 99.0;
        let mut an = StreamAnalyzer::default();
        let mut last = None;
        for i in 0..100 {
            last = an.ingest(triangle(i), i as f64 * dt);
        }
        let est = last.expect("estimate");
        assert_eq!(est.bpm, 100.0);
        assert_eq!(est.quality, Quality::Good);
    }

    #[test]
    fn frozen_clock_is_not_a_crash() {
        let mut an = StreamAnalyzer::default();
        for i in 0..150 {
            assert_eq!(an.ingest(sine(72.0, i), 42.0), None);
        }
    }

    #[test]
    fn config_validation() {
        assert!(AnalyzerConfig::default().validate().is_ok());
        let base = AnalyzerConfig::default();
        assert_eq!(
            AnalyzerConfig { capacity: 0, ..base }.validate(),
            Err(ConfigError::ZeroCapacity)
        );
        assert_eq!(
            AnalyzerConfig { smoothing_window: 0, ..base }.validate(),
            Err(ConfigError::ZeroWindow)
        );
        assert!(matches!(
            AnalyzerConfig { min_samples: 301, ..base }.validate(),
            Err(ConfigError::MinSamplesOutOfRange { .. })
        ));
        assert!(matches!(
            AnalyzerConfig { min_samples: 1, ..base }.validate(),
            Err(ConfigError::MinSamplesOutOfRange { .. })
        ));
        assert!(matches!(
            AnalyzerConfig { min_bpm: 220.0, ..base }.validate(),
            Err(ConfigError::InvalidBpmRange { .. })
        ));
        assert!(matches!(
            AnalyzerConfig { max_bpm: f64::NAN, ..base }.validate(),
            Err(ConfigError::InvalidBpmRange { .. })
        ));
        assert!(StreamAnalyzer::new(AnalyzerConfig { capacity: 0, ..base }).is_err());
    }
}
