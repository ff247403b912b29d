//! Streaming heart-rate pipeline: buffer -> smoother -> peak detector -> rate estimator.

mod analyzer;
mod buffer;
mod peaks;
mod rate;
mod smoother;

pub use analyzer::{AnalyzerConfig, ConfigError, Phase, StreamAnalyzer};
pub use buffer::Sample;
pub use rate::{HeartRateEstimate, Quality};

/// ~10 s of history at 30 samples/s.
pub const DEFAULT_CAPACITY: usize = 300;
/// ~3.3 s at 30 samples/s.
pub const DEFAULT_MIN_SAMPLES: usize = 100;
pub const DEFAULT_SMOOTHING_WINDOW: usize = 5;
pub const DEFAULT_MIN_BPM: f64 = 40.0;
pub const DEFAULT_MAX_BPM: f64 = 200.0;
