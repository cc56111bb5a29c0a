// src/profile.rs
//
// Historical daily traffic profile.
//
// Raw counts keyed by (hour, minute-bin) are averaged per bin, broadcast over
// the bin width and renormalised so the 1440 minute weights sum to 1. The
// resulting shape is what the corridor synthesizer scales by each corridor's
// daily volume.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{read_to_string, PipelineError};
use crate::types::{Minute, MINUTES_PER_DAY};

/// Width of one historical count bin, in minutes.
pub const DEFAULT_BIN_MINUTES: usize = 15;

/// One raw historical count sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficCount {
    pub hour: u8,
    pub minute: u8,
    pub count: f64,
}

/// Mean count for one (hour, minute) bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinAverage {
    pub hour: u8,
    pub minute: u8,
    pub mean: f64,
}

impl BinAverage {
    fn start_minute(&self) -> usize {
        self.hour as usize * 60 + self.minute as usize
    }
}

/// Average raw samples per (hour, minute) bin, ordered by time of day.
///
/// Samples with an out-of-range time or a non-finite count are rejected.
pub fn average_counts(samples: &[TrafficCount]) -> Result<Vec<BinAverage>, PipelineError> {
    let mut acc: BTreeMap<(u8, u8), (f64, u64)> = BTreeMap::new();
    for (i, s) in samples.iter().enumerate() {
        if s.hour >= 24 || s.minute >= 60 {
            return Err(PipelineError::invalid(
                format!("traffic_counts[{i}]"),
                format!("time {:02}:{:02} out of range", s.hour, s.minute),
            ));
        }
        if !s.count.is_finite() {
            return Err(PipelineError::invalid(
                format!("traffic_counts[{i}].count"),
                "count must be finite",
            ));
        }
        let slot = acc.entry((s.hour, s.minute)).or_insert((0.0, 0));
        slot.0 += s.count;
        slot.1 += 1;
    }
    Ok(acc
        .into_iter()
        .map(|((hour, minute), (sum, n))| BinAverage {
            hour,
            minute,
            mean: sum / n as f64,
        })
        .collect())
}

/// Normalised 1440-minute traffic shape.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyProfile {
    weights: Vec<f64>,
}

impl DailyProfile {
    /// Build a profile from (hour, minute-bin) averages.
    ///
    /// Each bin value, floored at 1.0, is broadcast over `bin_minutes`
    /// minutes starting at the bin's start. Minutes no bin covers stay at 1.0
    /// before normalisation.
    pub fn from_bins(bins: &[BinAverage], bin_minutes: usize) -> Self {
        let width = bin_minutes.max(1);
        let mut weights = vec![1.0_f64; MINUTES_PER_DAY];
        for bin in bins {
            let start = bin.start_minute();
            if start >= MINUTES_PER_DAY {
                continue;
            }
            let value = bin.mean.max(1.0);
            let end = (start + width).min(MINUTES_PER_DAY);
            for w in &mut weights[start..end] {
                *w = value;
            }
        }
        let total: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= total;
        }
        Self { weights }
    }

    /// Average raw samples and build the profile in one step.
    pub fn from_counts(samples: &[TrafficCount], bin_minutes: usize) -> Result<Self, PipelineError> {
        let bins = average_counts(samples)?;
        Ok(Self::from_bins(&bins, bin_minutes))
    }

    /// Load raw counts from a JSON array of `{hour, minute, count}` objects.
    ///
    /// A missing source file is a precondition failure, not a silent default.
    pub fn from_json_file<P: AsRef<Path>>(path: P, bin_minutes: usize) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::PreconditionFailed(format!(
                "historical traffic profile not found at {}",
                path.display()
            )));
        }
        let contents = read_to_string(path)?;
        let samples: Vec<TrafficCount> =
            serde_json::from_str(&contents).map_err(|e| PipelineError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        if samples.is_empty() {
            return Err(PipelineError::PreconditionFailed(format!(
                "historical traffic profile at {} has no samples",
                path.display()
            )));
        }
        Self::from_counts(&samples, bin_minutes)
    }

    /// Built-in weekday shape: morning and evening commute humps over a
    /// lunchtime shoulder, sampled on 15-minute bins.
    pub fn builtin_weekday() -> Self {
        let bins: Vec<BinAverage> = (0..MINUTES_PER_DAY / DEFAULT_BIN_MINUTES)
            .map(|i| {
                let start = i * DEFAULT_BIN_MINUTES;
                let h = start as f64 / 60.0;
                let hump = |centre: f64, width: f64, height: f64| {
                    height * (-((h - centre) / width).powi(2)).exp()
                };
                let mean = 18.0
                    + hump(8.0, 1.4, 190.0)
                    + hump(12.5, 2.6, 80.0)
                    + hump(17.25, 1.8, 230.0);
                BinAverage {
                    hour: (start / 60) as u8,
                    minute: (start % 60) as u8,
                    mean,
                }
            })
            .collect();
        Self::from_bins(&bins, DEFAULT_BIN_MINUTES)
    }

    /// Fraction of daily traffic at `minute`.
    pub fn weight(&self, minute: Minute) -> f64 {
        self.weights.get(minute as usize).copied().unwrap_or(0.0)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_per_bin() {
        let samples = [
            TrafficCount { hour: 8, minute: 0, count: 100.0 },
            TrafficCount { hour: 8, minute: 0, count: 300.0 },
            TrafficCount { hour: 7, minute: 45, count: 50.0 },
        ];
        let bins = average_counts(&samples).unwrap();
        assert_eq!(bins.len(), 2);
        assert_eq!((bins[0].hour, bins[0].minute), (7, 45));
        assert_eq!(bins[1].mean, 200.0);
    }

    #[test]
    fn bins_broadcast_and_normalise() {
        let bins = [BinAverage { hour: 0, minute: 0, mean: 10.0 }];
        let p = DailyProfile::from_bins(&bins, 15);
        let total: f64 = p.as_slice().iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        // 15 minutes at 10, 1425 minutes at 1.
        let expected_hi = 10.0 / (150.0 + 1425.0);
        assert!((p.weight(0) - expected_hi).abs() < 1e-15);
        assert!((p.weight(14) - expected_hi).abs() < 1e-15);
        assert!(p.weight(15) < p.weight(14));
    }

    #[test]
    fn low_counts_floor_at_one() {
        let bins = [BinAverage { hour: 12, minute: 0, mean: 0.0 }];
        let p = DailyProfile::from_bins(&bins, 15);
        assert!((p.weight(720) - 1.0 / 1440.0).abs() < 1e-15);
    }

    #[test]
    fn last_bin_is_truncated_at_midnight() {
        let bins = [BinAverage { hour: 23, minute: 50, mean: 5.0 }];
        let p = DailyProfile::from_bins(&bins, 15);
        assert_eq!(p.as_slice().len(), MINUTES_PER_DAY);
        assert!(p.weight(1439) > p.weight(1429));
    }

    #[test]
    fn bad_time_rejected() {
        let samples = [TrafficCount { hour: 24, minute: 0, count: 1.0 }];
        assert!(average_counts(&samples).is_err());
    }

    #[test]
    fn missing_source_is_precondition_failure() {
        let err = DailyProfile::from_json_file("/nonexistent/counts.json", 15).unwrap_err();
        assert!(matches!(err, PipelineError::PreconditionFailed(_)));
    }

    #[test]
    fn builtin_weekday_peaks_in_evening_commute() {
        let p = DailyProfile::builtin_weekday();
        let total: f64 = p.as_slice().iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(p.weight(17 * 60 + 15) > p.weight(3 * 60));
    }
}
