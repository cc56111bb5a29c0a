// src/features.rs
//
// Feature extraction for the threat & crowd predictor.
//
// Game-state features are always present. Corridor features summarise the
// minute's corridor loads against their non-event baseline when context is
// supplied, and take neutral values (0 for totals, 1.0 for ratios) otherwise.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::GameState;

/// Ordered names of every feature a model bundle may reference.
pub const FEATURE_NAMES: [&str; 9] = [
    "score_diff",
    "minutes_remaining",
    "momentum",
    "blowout_indicator",
    "time_pressure",
    "total_transit_load",
    "total_pedestrian_volume",
    "traffic_surge_ratio",
    "max_corridor_saturation",
];

/// Threshold (home trailing by this much, Q3 or later) for the blowout flag.
pub const BLOWOUT_FEATURE_DIFF: i32 = -14;

/// Minutes of regulation play.
pub const REGULATION_MINUTES: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector {
    pub score_diff: f64,
    pub minutes_remaining: f64,
    pub momentum: f64,
    pub blowout_indicator: f64,
    pub time_pressure: f64,
    pub total_transit_load: f64,
    pub total_pedestrian_volume: f64,
    pub traffic_surge_ratio: f64,
    pub max_corridor_saturation: f64,
}

impl FeatureVector {
    /// Look up a feature by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        let v = match name {
            "score_diff" => self.score_diff,
            "minutes_remaining" => self.minutes_remaining,
            "momentum" => self.momentum,
            "blowout_indicator" => self.blowout_indicator,
            "time_pressure" => self.time_pressure,
            "total_transit_load" => self.total_transit_load,
            "total_pedestrian_volume" => self.total_pedestrian_volume,
            "traffic_surge_ratio" => self.traffic_surge_ratio,
            "max_corridor_saturation" => self.max_corridor_saturation,
            _ => return None,
        };
        Some(v)
    }

    /// Project onto an ordered list of names. `None` if any name is unknown.
    pub fn project(&self, names: &[String]) -> Option<Vec<f64>> {
        names.iter().map(|n| self.get(n)).collect()
    }
}

/// Transit and pedestrian counts for one corridor at one minute.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CorridorSample {
    pub transit_load: f64,
    pub pedestrian_volume: f64,
}

/// Per-corridor loads for one minute plus an optional non-event baseline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CorridorContext {
    pub current: BTreeMap<String, CorridorSample>,
    pub baseline: BTreeMap<String, CorridorSample>,
}

/// Build the feature vector for one minute.
pub fn make_feature_vector(game: &GameState, corridors: Option<&CorridorContext>) -> FeatureVector {
    let mut fv = match game.snapshot() {
        None => FeatureVector {
            score_diff: 0.0,
            minutes_remaining: REGULATION_MINUTES,
            momentum: 0.0,
            blowout_indicator: 0.0,
            time_pressure: 0.0,
            ..neutral_traffic()
        },
        Some(s) => {
            let quarter = s.quarter as f64;
            let minutes_remaining =
                ((4.0 - quarter) * 15.0 + s.clock_seconds_remaining as f64 / 60.0).max(0.0);
            let diff = s.score_diff();
            let momentum = s.momentum_raw.unwrap_or(0.0).tanh();
            let blowout = s.quarter >= 3 && diff <= BLOWOUT_FEATURE_DIFF;
            // Q4 minutes count double.
            let time_pressure = if minutes_remaining <= 0.0 {
                0.0
            } else {
                let weight = if s.quarter >= 4 { 2.0 } else { 1.0 };
                (minutes_remaining / REGULATION_MINUTES * weight).min(1.0)
            };
            FeatureVector {
                score_diff: diff as f64,
                minutes_remaining,
                momentum,
                blowout_indicator: if blowout { 1.0 } else { 0.0 },
                time_pressure,
                ..neutral_traffic()
            }
        }
    };

    if let Some(ctx) = corridors.filter(|c| !c.current.is_empty()) {
        apply_corridor_features(&mut fv, ctx);
    }
    fv
}

fn neutral_traffic() -> FeatureVector {
    FeatureVector {
        score_diff: 0.0,
        minutes_remaining: 0.0,
        momentum: 0.0,
        blowout_indicator: 0.0,
        time_pressure: 0.0,
        total_transit_load: 0.0,
        total_pedestrian_volume: 0.0,
        traffic_surge_ratio: 1.0,
        max_corridor_saturation: 1.0,
    }
}

fn apply_corridor_features(fv: &mut FeatureVector, ctx: &CorridorContext) {
    let total_transit: f64 = ctx.current.values().map(|c| c.transit_load).sum();
    let total_ped: f64 = ctx.current.values().map(|c| c.pedestrian_volume).sum();
    fv.total_transit_load = total_transit;
    fv.total_pedestrian_volume = total_ped;

    if ctx.baseline.is_empty() {
        return;
    }

    let base_transit: f64 = ctx.baseline.values().map(|c| c.transit_load).sum();
    let base_ped: f64 = ctx.baseline.values().map(|c| c.pedestrian_volume).sum();
    let ratio = |cur: f64, base: f64| if base > 0.0 { cur / base } else { 1.0 };
    fv.traffic_surge_ratio = ratio(total_transit, base_transit).max(ratio(total_ped, base_ped));

    // A zero or missing baseline counts as 1 so one corridor cannot divide by zero.
    let saturation = ctx
        .current
        .iter()
        .map(|(id, cur)| {
            let base = ctx.baseline.get(id).copied().unwrap_or_default();
            let bt = if base.transit_load > 0.0 { base.transit_load } else { 1.0 };
            let bp = if base.pedestrian_volume > 0.0 { base.pedestrian_volume } else { 1.0 };
            (cur.transit_load / bt).max(cur.pedestrian_volume / bp)
        })
        .fold(f64::NEG_INFINITY, f64::max);
    fv.max_corridor_saturation = if saturation.is_finite() { saturation } else { 1.0 };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GameSnapshot;

    fn snap(quarter: u8, clock_secs: u32, home: u32, away: u32) -> GameState {
        GameState::InEvent(GameSnapshot {
            quarter,
            clock: format!("{}:{:02}", clock_secs / 60, clock_secs % 60),
            clock_seconds_remaining: clock_secs,
            home,
            away,
            score_diff: None,
            play: None,
            momentum_raw: None,
        })
    }

    #[test]
    fn absent_game_uses_defaults() {
        let fv = make_feature_vector(&GameState::NoActiveGame, None);
        assert_eq!(fv.score_diff, 0.0);
        assert_eq!(fv.minutes_remaining, 60.0);
        assert_eq!(fv.time_pressure, 0.0);
        assert_eq!(fv.traffic_surge_ratio, 1.0);
        assert_eq!(fv.max_corridor_saturation, 1.0);
        assert_eq!(fv.total_transit_load, 0.0);
    }

    #[test]
    fn minutes_remaining_and_time_pressure() {
        let fv = make_feature_vector(&snap(2, 450, 7, 14), None);
        assert!((fv.minutes_remaining - 37.5).abs() < 1e-12);
        assert!((fv.time_pressure - 37.5 / 60.0).abs() < 1e-12);
        assert_eq!(fv.score_diff, -7.0);

        // Q4 doubles the weight.
        let fv = make_feature_vector(&snap(4, 600, 0, 0), None);
        assert!((fv.time_pressure - (10.0 / 60.0) * 2.0).abs() < 1e-12);

        let fv = make_feature_vector(&snap(4, 0, 0, 0), None);
        assert_eq!(fv.minutes_remaining, 0.0);
        assert_eq!(fv.time_pressure, 0.0);
    }

    #[test]
    fn blowout_flag_needs_q3_and_fourteen() {
        assert_eq!(make_feature_vector(&snap(3, 900, 0, 14), None).blowout_indicator, 1.0);
        assert_eq!(make_feature_vector(&snap(2, 900, 0, 21), None).blowout_indicator, 0.0);
        assert_eq!(make_feature_vector(&snap(4, 900, 0, 13), None).blowout_indicator, 0.0);
    }

    #[test]
    fn momentum_is_bounded() {
        let mut s = GameSnapshot::pregame();
        s.momentum_raw = Some(50.0);
        let fv = make_feature_vector(&GameState::InEvent(s), None);
        assert!(fv.momentum <= 1.0 && fv.momentum > 0.99);
    }

    #[test]
    fn corridor_ratios_against_baseline() {
        let mut ctx = CorridorContext::default();
        ctx.current.insert("a".into(), CorridorSample { transit_load: 20.0, pedestrian_volume: 50.0 });
        ctx.current.insert("b".into(), CorridorSample { transit_load: 10.0, pedestrian_volume: 10.0 });
        ctx.baseline.insert("a".into(), CorridorSample { transit_load: 10.0, pedestrian_volume: 10.0 });
        ctx.baseline.insert("b".into(), CorridorSample { transit_load: 10.0, pedestrian_volume: 10.0 });

        let fv = make_feature_vector(&GameState::NoActiveGame, Some(&ctx));
        assert_eq!(fv.total_transit_load, 30.0);
        assert_eq!(fv.total_pedestrian_volume, 60.0);
        assert_eq!(fv.traffic_surge_ratio, 3.0);
        assert_eq!(fv.max_corridor_saturation, 5.0);
    }

    #[test]
    fn context_without_baseline_keeps_neutral_ratios() {
        let mut ctx = CorridorContext::default();
        ctx.current.insert("a".into(), CorridorSample { transit_load: 20.0, pedestrian_volume: 50.0 });
        let fv = make_feature_vector(&GameState::NoActiveGame, Some(&ctx));
        assert_eq!(fv.total_transit_load, 20.0);
        assert_eq!(fv.traffic_surge_ratio, 1.0);
        assert_eq!(fv.max_corridor_saturation, 1.0);
    }

    #[test]
    fn project_rejects_unknown_names() {
        let fv = make_feature_vector(&GameState::NoActiveGame, None);
        let names = vec!["score_diff".to_string(), "minutes_remaining".to_string()];
        assert_eq!(fv.project(&names), Some(vec![0.0, 60.0]));
        assert_eq!(fv.project(&["wind_speed".to_string()]), None);
    }
}
