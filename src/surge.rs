// src/surge.rs
//
// Monte Carlo surge-velocity simulator.
//
// Each minute's point estimate (threat, crowd, game state) becomes a
// deterministic mean rate and spread. N normal samples are drawn
// independently per minute, clipped at zero, and the 95th percentile is
// reported as the worst-case planning envelope. A single seeded ChaCha8
// stream is consumed in minute order, so (timeline, seed, N) fully
// determines the curve.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;

use crate::config::SurgeConfig;
use crate::stats::quantile_sorted;
use crate::types::PredictionRecord;

/// Home trailing by at least this much in Q3 or later.
pub const BLOWOUT_SURGE_DIFF: i32 = -21;

pub const SURGE_PERCENTILE: f64 = 0.95;

/// Deterministic per-minute rate parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MinuteRate {
    pub mean: f64,
    pub sigma: f64,
    pub blowout: bool,
}

/// Gaussian bump in [0, 1] centred on the catalyst minute.
pub fn catalyst_wave(minute: f64, cfg: &SurgeConfig) -> f64 {
    let z = (minute - cfg.catalyst_minute) / cfg.catalyst_width;
    (-0.5 * z * z).exp()
}

pub fn minute_rate(record: &PredictionRecord, cfg: &SurgeConfig) -> MinuteRate {
    let capacity = cfg.capacity.max(1) as f64;
    let threat = if record.threat_score.is_finite() {
        record.threat_score.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let crowd = (record.crowd_volume as f64).min(capacity);

    let baseline = 12.0 + (crowd / capacity) * 95.0 + threat * 105.0;
    let blowout = record.game_state.quarter() >= 3
        && record.game_state.score_diff() <= BLOWOUT_SURGE_DIFF;
    let wave = catalyst_wave(record.minute as f64, cfg);

    let multiplier = if blowout {
        2.4 + 0.9 * wave + 0.6 * threat
    } else {
        1.0 + 0.25 * wave + 0.2 * threat
    };
    let mean = (baseline * multiplier).max(5.0);
    let sigma = (mean * if blowout { 0.48 } else { 0.24 }).max(4.0);

    MinuteRate { mean, sigma, blowout }
}

/// Empirical p95 of `n` normal draws clipped at zero.
pub fn sample_p95<R: Rng + ?Sized>(mean: f64, sigma: f64, n: usize, rng: &mut R) -> f64 {
    let Ok(dist) = Normal::new(mean, sigma) else {
        return mean.max(0.0);
    };
    let mut samples: Vec<f64> = (0..n.max(1)).map(|_| dist.sample(rng).max(0.0)).collect();
    samples.sort_by(|a, b| a.total_cmp(b));
    quantile_sorted(&samples, SURGE_PERCENTILE)
}

/// Per-minute p95 surge velocity (fans/minute), one value per timeline entry.
pub fn simulate_surge_velocity(timeline: &[PredictionRecord], cfg: &SurgeConfig) -> Vec<u32> {
    let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
    timeline
        .iter()
        .map(|record| {
            let rate = minute_rate(record, cfg);
            let p95 = sample_p95(rate.mean, rate.sigma, cfg.num_simulations, &mut rng);
            p95.round_ties_even().clamp(0.0, u32::MAX as f64) as u32
        })
        .collect()
}
