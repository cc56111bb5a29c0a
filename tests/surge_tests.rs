// tests/surge_tests.rs
//
// Monte Carlo surge simulator: convergence to the analytic Gaussian p95 and
// seed determinism.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crowdshield::config::SurgeConfig;
use crowdshield::surge::{minute_rate, sample_p95, simulate_surge_velocity};
use crowdshield::{GameSnapshot, GameState, PredictionRecord};

/// z-score of the 95th percentile of a standard normal.
const Z95: f64 = 1.6448536269514722;

fn record(minute: u16, threat: f64, crowd: u32, game_state: GameState) -> PredictionRecord {
    PredictionRecord {
        scenario_id: "surge_test".to_string(),
        minute,
        threat_score: threat,
        crowd_volume: crowd,
        game_state,
    }
}

fn timeline() -> Vec<PredictionRecord> {
    (0..1440u16)
        .map(|m| {
            let threat = if (1110..=1260).contains(&m) { 0.6 } else { 0.05 };
            record(m, threat, (threat * 68_000.0) as u32, GameState::NoActiveGame)
        })
        .collect()
}

#[test]
fn calm_minute_converges_to_analytic_p95() {
    // Threat 0, no crowd, far from the catalyst: mean 12, sigma 4.
    let cfg = SurgeConfig::default();
    let rate = minute_rate(&record(300, 0.0, 0, GameState::NoActiveGame), &cfg);
    assert!(!rate.blowout);
    assert!((rate.mean - 12.0).abs() < 1e-9);
    assert!((rate.sigma - 4.0).abs() < 1e-9);

    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let p95 = sample_p95(rate.mean, rate.sigma, 400_000, &mut rng);
    let analytic = rate.mean + Z95 * rate.sigma;
    assert!((p95 - analytic).abs() < 0.1, "empirical {p95} vs analytic {analytic}");
}

#[test]
fn blowout_rate_uses_wide_spread() {
    let mut s = GameSnapshot::pregame();
    s.quarter = 3;
    s.home = 7;
    s.away = 42;
    s.score_diff = None;
    let cfg = SurgeConfig::default();

    // At the catalyst minute the wave is exactly 1.
    let rate = minute_rate(&record(1125, 1.0, 68_000, GameState::InEvent(s)), &cfg);
    assert!(rate.blowout);
    assert!((rate.mean - 212.0 * 3.9).abs() < 1e-9);
    assert!((rate.sigma - rate.mean * 0.48).abs() < 1e-9);
}

#[test]
fn same_seed_same_curve() {
    let cfg = SurgeConfig {
        num_simulations: 1_000,
        ..SurgeConfig::default()
    };
    let t = timeline();
    let a = simulate_surge_velocity(&t, &cfg);
    let b = simulate_surge_velocity(&t, &cfg);
    assert_eq!(a.len(), 1440);
    assert_eq!(a, b);

    let reseeded = SurgeConfig { seed: 43, ..cfg };
    assert_ne!(a, simulate_surge_velocity(&t, &reseeded));
}

#[test]
fn event_window_surges_above_quiet_hours() {
    let cfg = SurgeConfig {
        num_simulations: 2_000,
        ..SurgeConfig::default()
    };
    let curve = simulate_surge_velocity(&timeline(), &cfg);
    assert!(curve[1125] > curve[300]);
    assert!(curve.iter().all(|&v| v > 0));
}
