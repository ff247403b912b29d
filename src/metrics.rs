use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide traffic counters, shared by all sessions.
#[derive(Default)]
pub struct Counters {
    pub samples_in: AtomicU64,
    pub estimates_out: AtomicU64,
    pub sessions_opened: AtomicU64,
}

impl Counters {
    pub fn record_sample(&self, produced_estimate: bool) {
        self.samples_in.fetch_add(1, Ordering::Relaxed);
        if produced_estimate {
            self.estimates_out.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Exponentially weighted events-per-second.
pub struct RateAverager {
    tau_secs: f64,
    smoothed: f64,
}

impl RateAverager {
    pub fn new(tau_secs: f64) -> Self {
        Self { tau_secs, smoothed: 0.0 }
    }

    pub fn update(&mut self, delta: u64, dt_secs: f64) -> f64 {
        let dt = dt_secs.max(1e-3);
        let alpha = 1.0 - (-dt / self.tau_secs).exp();
        let inst = delta as f64 / dt;
        self.smoothed = self.smoothed * (1.0 - alpha) + inst * alpha;
        self.smoothed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ewma_decays_gradually() {
        let mut avg = RateAverager::new(5.0);
        // 30 samples/s for one second, then silence
        let r1 = avg.update(30, 1.0);
        let r2 = avg.update(0, 1.0);
        assert!(r1 > r2);
        assert!(r2 > 0.0);
    }

    #[test]
    fn counters_track_estimates() {
        let c = Counters::default();
        c.record_sample(false);
        c.record_sample(true);
        assert_eq!(c.samples_in.load(Ordering::Relaxed), 2);
        assert_eq!(c.estimates_out.load(Ordering::Relaxed), 1);
    }
}
