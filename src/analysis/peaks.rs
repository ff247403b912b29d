/// Indices of strict interior local maxima, ascending.
///
/// The first and last index are never candidates; plateaus and monotone runs
/// produce nothing. No prominence or spacing filter is applied.
pub fn detect_peaks(values: &[f64]) -> Vec<usize> {
    values
        .windows(3)
        .enumerate()
        .filter(|(_, w)| w[1] > w[0] && w[1] > w[2])
        .map(|(i, _)| i + 1)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_interior_maxima() {
        let v = [0.0, 2.0, 1.0, 3.0, 0.5, 0.7, 0.6];
        assert_eq!(detect_peaks(&v), vec![1, 3, 5]);
    }

    #[test]
    fn endpoints_are_never_peaks() {
        let v = [9.0, 1.0, 2.0, 1.0, 9.0];
        let peaks = detect_peaks(&v);
        assert_eq!(peaks, vec![2]);
        assert!(!peaks.contains(&0));
        assert!(!peaks.contains(&(v.len() - 1)));
    }

    #[test]
    fn monotonic_input_has_no_peaks() {
        let up: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let down: Vec<f64> = up.iter().rev().copied().collect();
        assert!(detect_peaks(&up).is_empty());
        assert!(detect_peaks(&down).is_empty());
    }

    #[test]
    fn plateaus_do_not_count() {
        assert!(detect_peaks(&[0.0, 1.0, 1.0, 0.0]).is_empty());
        assert!(detect_peaks(&[2.0, 2.0, 2.0]).is_empty());
    }

    #[test]
    fn short_inputs() {
        assert!(detect_peaks(&[]).is_empty());
        assert!(detect_peaks(&[1.0]).is_empty());
        assert!(detect_peaks(&[1.0, 2.0]).is_empty());
    }
}
