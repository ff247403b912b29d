use std::collections::VecDeque;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sample {
    pub value: f64,
    /// Seconds; non-decreasing within one stream.
    pub timestamp: f64,
}

impl Sample {
    pub fn new(value: f64, timestamp: f64) -> Self {
        Self { value, timestamp }
    }
}

/// Fixed-capacity sliding window of samples in arrival order.
///
/// Appending at capacity evicts the oldest sample first, so `len()` never
/// exceeds the capacity.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    capacity: usize,
    samples: VecDeque<Sample>,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn append(&mut self, sample: Sample) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    #[allow(dead_code)]
    pub fn timestamps(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.timestamp).collect()
    }

    pub fn oldest_timestamp(&self) -> Option<f64> {
        self.samples.front().map(|s| s.timestamp)
    }

    pub fn newest_timestamp(&self) -> Option<f64> {
        self.samples.back().map(|s| s.timestamp)
    }

    /// Span between the newest and the oldest sample, in seconds.
    pub fn elapsed(&self) -> Option<f64> {
        Some(self.newest_timestamp()? - self.oldest_timestamp()?)
    }
}
