// src/timeline.rs
//
// Serving-side timeline assembly.
//
// Cached rows are merged into 1440 frames in minute order. Minutes with no
// prediction read as neutral (threat 0, crowd 0, no game); minutes with no
// routing row have no severity and empty route sets. A scenario with no rows
// at all is served from the synthetic demo generator and labelled as such,
// never as a timeline of silent zeros.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::cache::{CacheStore, ScenarioRows};
use crate::catalog::RouteCatalog;
use crate::error::PipelineError;
use crate::scenario::{ProfileTag, Scenario, ScenarioRegistry};
use crate::types::{
    all_minutes, minute_label, GameSnapshot, GameState, Minute, PredictionRecord, Route,
    RoutingDecisionRecord, Severity, MINUTES_PER_DAY,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineSource {
    Cache,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineFrame {
    pub minute: Minute,
    pub time_label: String,
    pub transit_load: BTreeMap<String, u32>,
    pub pedestrian_volume: BTreeMap<String, u32>,
    pub egress_threat_score: f64,
    pub estimated_crowd_volume: u32,
    pub game_state: GameState,
    pub danger_routes: Vec<Route>,
    pub safe_routes: Vec<Route>,
    pub alert_message: Option<String>,
    pub severity: Option<Severity>,
}

impl TimelineFrame {
    fn neutral(minute: Minute) -> Self {
        Self {
            minute,
            time_label: minute_label(minute),
            transit_load: BTreeMap::new(),
            pedestrian_volume: BTreeMap::new(),
            egress_threat_score: 0.0,
            estimated_crowd_volume: 0,
            game_state: GameState::NoActiveGame,
            danger_routes: Vec::new(),
            safe_routes: Vec::new(),
            alert_message: None,
            severity: None,
        }
    }

    /// Back-project the frame onto a prediction row (for the surge pass).
    pub fn to_prediction(&self, scenario_id: &str) -> PredictionRecord {
        PredictionRecord {
            scenario_id: scenario_id.to_string(),
            minute: self.minute,
            threat_score: self.egress_threat_score,
            crowd_volume: self.estimated_crowd_volume,
            game_state: self.game_state.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioTimeline {
    pub scenario_id: String,
    pub metadata: Scenario,
    pub source: TimelineSource,
    pub timeline: Vec<TimelineFrame>,
}

/// Merge one scenario's cached rows into per-minute frames.
pub fn assemble_timeline(rows: &ScenarioRows) -> Vec<TimelineFrame> {
    let mut frames: Vec<TimelineFrame> = all_minutes().map(TimelineFrame::neutral).collect();

    for r in &rows.corridor_loads {
        if let Some(f) = frames.get_mut(r.minute as usize) {
            f.transit_load.insert(r.corridor_id.clone(), r.transit_load);
            f.pedestrian_volume.insert(r.corridor_id.clone(), r.pedestrian_volume);
        }
    }
    for p in &rows.predictions {
        if let Some(f) = frames.get_mut(p.minute as usize) {
            f.egress_threat_score = p.threat_score;
            f.estimated_crowd_volume = p.crowd_volume;
            f.game_state = p.game_state.clone();
        }
    }
    for r in &rows.routing_decisions {
        if let Some(f) = frames.get_mut(r.minute as usize) {
            apply_routing(f, r);
        }
    }
    frames
}

fn apply_routing(frame: &mut TimelineFrame, r: &RoutingDecisionRecord) {
    frame.danger_routes = r.danger_routes.clone();
    frame.safe_routes = r.safe_routes.clone();
    frame.alert_message = Some(r.alert_message.clone());
    frame.severity = Some(r.severity);
}

/// Timeline for a scenario: cached when present, synthetic otherwise.
pub fn load_timeline(
    registry: &ScenarioRegistry,
    store: &dyn CacheStore,
    catalog: &RouteCatalog,
    scenario_id: &str,
) -> Result<ScenarioTimeline, PipelineError> {
    let scenario = registry.get(scenario_id)?;
    let rows = store.load_scenario(scenario_id)?;

    let (source, timeline) = if rows.is_empty() {
        warn!(scenario_id, "no cached rows; serving synthetic timeline");
        (TimelineSource::Synthetic, generate_synthetic_timeline(scenario, catalog))
    } else {
        (TimelineSource::Cache, assemble_timeline(&rows))
    };

    Ok(ScenarioTimeline {
        scenario_id: scenario.id.clone(),
        metadata: scenario.clone(),
        source,
        timeline,
    })
}

/// Five alert bands used by the synthetic demo timeline.
pub fn score_to_severity(threat: f64) -> Severity {
    let level = if threat >= 0.85 {
        5
    } else if threat >= 0.7 {
        4
    } else if threat >= 0.5 {
        3
    } else if threat >= 0.3 {
        2
    } else {
        1
    };
    Severity::new(level).unwrap_or(Severity::CALM)
}

const SYNTH_PREGAME_START: Minute = 17 * 60;
const SYNTH_GAME_START: Minute = 18 * 60;
const SYNTH_GAME_END: Minute = 21 * 60;
const SYNTH_POSTGAME_END: Minute = 23 * 60;

/// Threat curve for the synthetic demo. Not calibrated.
fn synthetic_threat(minute: Minute, profile: ProfileTag) -> f64 {
    let blowout = profile == ProfileTag::BlowoutQ3;
    let high = profile == ProfileTag::HighAttendanceCloseGame;

    if (SYNTH_PREGAME_START..SYNTH_GAME_START).contains(&minute) {
        return if high { 0.3 } else { 0.2 };
    }
    if (SYNTH_GAME_START..SYNTH_GAME_END).contains(&minute) {
        let gm = (minute - SYNTH_GAME_START) as f64;
        let mut base = 0.3 + (gm / 24.0).sin().max(0.0) * 0.08;
        if high {
            base += 0.25;
        }
        if blowout && gm >= 90.0 {
            base = 0.88;
        } else if blowout && gm >= 60.0 {
            base = 0.72;
        }
        return base.min(1.0);
    }
    if (SYNTH_GAME_END..SYNTH_POSTGAME_END).contains(&minute) {
        let decay = (1.0 - (minute - SYNTH_GAME_END) as f64 / 120.0).max(0.0);
        return if high { 0.6 } else { 0.45 } * decay;
    }
    0.08
}

fn synthetic_game(minute: Minute, profile: ProfileTag) -> GameState {
    if !(SYNTH_GAME_START..SYNTH_GAME_END).contains(&minute) {
        return GameState::NoActiveGame;
    }
    let gm = (minute - SYNTH_GAME_START) as u32;
    let quarter = (gm / 45 + 1).min(4);
    let (home, away) = match profile {
        ProfileTag::BlowoutQ3 if gm < 90 => ((gm / 10).min(17), (gm / 6).min(28)),
        ProfileTag::BlowoutQ3 => (14, (35 + ((gm - 90) / 12) * 7).min(49)),
        ProfileTag::HighAttendanceCloseGame => ((gm / 7).min(31), (gm / 8).min(28)),
        ProfileTag::NormalExit => ((gm / 9).min(24), (gm / 10).min(20)),
    };
    let clock_min = 15u32.saturating_sub((gm % 45) / 3);
    let clock_sec = (gm % 3) * 20;
    GameState::InEvent(GameSnapshot {
        quarter: quarter as u8,
        clock: format!("{clock_min}:{clock_sec:02}"),
        clock_seconds_remaining: clock_min * 60 + clock_sec,
        home,
        away,
        score_diff: None,
        play: None,
        momentum_raw: None,
    })
}

/// Demo timeline used when a scenario has no cached rows. Routes are taken
/// from the catalog by position, so they satisfy the same invariants as
/// cached decisions.
pub fn generate_synthetic_timeline(scenario: &Scenario, catalog: &RouteCatalog) -> Vec<TimelineFrame> {
    let routes = catalog.routes();
    let blowout = scenario.profile == ProfileTag::BlowoutQ3;
    let mut out = Vec::with_capacity(MINUTES_PER_DAY);

    for minute in all_minutes() {
        let threat = synthetic_threat(minute, scenario.profile);
        let mut frame = TimelineFrame::neutral(minute);

        frame.egress_threat_score = (threat * 1000.0).round() / 1000.0;
        frame.estimated_crowd_volume = (scenario.attendance as f64 * threat).round() as u32;
        frame.game_state = synthetic_game(minute, scenario.profile);
        frame.severity = Some(score_to_severity(threat));

        let t = threat;
        frame.transit_load = BTreeMap::from([
            ("stadium_1st_ave".to_string(), (200.0 + t * 1700.0) as u32),
            ("king_street".to_string(), (120.0 + (t - 0.35).max(0.0) * 1200.0) as u32),
            ("s_atlantic_st".to_string(), (80.0 + (t - 0.5).max(0.0) * 950.0) as u32),
        ]);
        frame.pedestrian_volume = BTreeMap::from([
            ("stadium_1st_ave".to_string(), (120.0 + t * 1200.0) as u32),
            ("occidental_ave".to_string(), (90.0 + t * 700.0) as u32),
        ]);

        if threat >= 0.5 {
            let mut danger: Vec<usize> = vec![0];
            let mut safe: Vec<usize> = vec![1, 2];
            if blowout && threat >= 0.85 {
                danger.push(5);
                safe.push(3);
            }
            let pick = |idx: &[usize]| -> Vec<Route> { idx.iter().filter_map(|i| routes.get(*i).cloned()).collect() };
            frame.danger_routes = pick(&danger);
            frame.safe_routes = pick(&safe);
            frame.alert_message = Some(
                if threat >= 0.85 {
                    "CRITICAL: Mass egress predicted. Prioritize human safety rerouting now."
                } else if threat >= 0.7 {
                    "HIGH RISK: Early departure wave detected. Redirect to alternate corridors."
                } else {
                    "ELEVATED: Monitoring transit congestion and queue growth."
                }
                .to_string(),
            );
        } else {
            frame.alert_message = Some("Crowd conditions stable.".to_string());
        }

        out.push(frame);
    }
    out
}
