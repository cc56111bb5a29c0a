// src/stats.rs
//
// Small deterministic statistics helpers.
// - quantile_sorted: linear-interpolation quantile over a sorted slice
// - CurveStats: running mean and first-occurrence peak of a minute curve

use crate::types::Minute;

/// Quantile of a sorted slice using linear interpolation between the two
/// nearest ranks (`p` clamped to [0, 1]). NaN for an empty slice.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let p = p.clamp(0.0, 1.0);
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let idx = p * ((n - 1) as f64);
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi || hi >= n {
        return sorted[lo.min(n - 1)];
    }
    let w = idx - (lo as f64);
    sorted[lo] * (1.0 - w) + sorted[hi] * w
}

/// Running mean and peak of a per-minute curve.
///
/// The surge export feeds it the p95 velocity of each minute in order; the
/// peak keeps the earliest minute on ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurveStats {
    n: u64,
    mean: f64,
    peak: Option<(Minute, f64)>,
}

impl CurveStats {
    /// Adds the value for `minute` if finite. Non-finite values are ignored.
    pub fn add(&mut self, minute: Minute, x: f64) {
        if !x.is_finite() {
            return;
        }
        self.n += 1;
        self.mean += (x - self.mean) / (self.n as f64);
        if self.peak.map_or(true, |(_, p)| x > p) {
            self.peak = Some((minute, x));
        }
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    /// 0 for an empty curve.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn peak(&self) -> Option<(Minute, f64)> {
        self.peak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile_sorted(&v, 0.0), 1.0);
        assert_eq!(quantile_sorted(&v, 1.0), 5.0);
        assert_eq!(quantile_sorted(&v, 0.5), 3.0);
        assert!((quantile_sorted(&v, 0.95) - 4.8).abs() < 1e-12);
        assert!(quantile_sorted(&[], 0.5).is_nan());
        assert_eq!(quantile_sorted(&[7.0], 0.3), 7.0);
    }

    #[test]
    fn curve_stats_track_mean_and_first_peak() {
        let mut s = CurveStats::default();
        assert_eq!(s.peak(), None);
        assert_eq!(s.mean(), 0.0);
        for (m, v) in [(0, 2.0), (1, 9.0), (2, f64::NAN), (3, 9.0), (4, 5.0)] {
            s.add(m, v);
        }
        assert_eq!(s.n(), 4);
        assert!((s.mean() - 6.25).abs() < 1e-12);
        assert_eq!(s.peak(), Some((1, 9.0)));
    }
}
