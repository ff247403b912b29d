/// Centered moving average with zero padding at both edges.
///
/// `out[i]` is the dot product of the `window` inputs centered on `i` with a
/// uniform kernel of weight `1 / window`, where indices outside the series
/// contribute zero. Edge outputs are therefore attenuated rather than
/// averaged over fewer points, which matches a same-length convolution.
pub fn smooth(values: &[f64], window: usize) -> Vec<f64> {
    let w = window.max(1);
    if w == 1 {
        return values.to_vec();
    }
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let offset = (w - 1) / 2;
    let weight = 1.0 / w as f64;
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        // window covers i + offset - (w - 1) ..= i + offset, clipped to 0..n
        let lo = (i + offset).saturating_sub(w - 1);
        let hi = (i + offset).min(n - 1);
        let mut acc = 0.0;
        for v in &values[lo..=hi] {
            acc += v * weight;
        }
        out.push(acc);
    }
    out
}

#[derive(Copy, Clone, Debug)]
pub struct Smoother {
    window: usize,
}

impl Smoother {
    pub fn new(window: usize) -> Self {
        Self { window: window.max(1) }
    }

    pub fn smooth(&self, values: &[f64]) -> Vec<f64> {
        smooth(values, self.window)
    }
}

impl Default for Smoother {
    fn default() -> Self {
        Self::new(super::DEFAULT_SMOOTHING_WINDOW)
    }
}
