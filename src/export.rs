// src/export.rs
//
// Surge export: per-minute frames combining the cached timeline with the
// Monte Carlo p95 surge curve, plus summary statistics.
//
// Station lock-down is declared when platform utilisation reaches 110 % of
// the critical capacity threshold or threat reaches 0.92. A locked-down
// minute with no routing decision falls back to the standard reroute
// (stadium station closed, King Street and 4th Ave open).

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cache::sha256_hex;
use crate::catalog::RouteCatalog;
use crate::config::SurgeConfig;
use crate::error::PipelineError;
use crate::stats::CurveStats;
use crate::surge::simulate_surge_velocity;
use crate::timeline::{ScenarioTimeline, TimelineSource};
use crate::types::{GameState, Minute, PredictionRecord, Route, Severity};

pub const LOCKDOWN_UTILIZATION_PCT: u32 = 110;
pub const LOCKDOWN_THREAT: f64 = 0.92;
pub const CRITICAL_SEVERITY_THREAT: f64 = 0.85;

const HOTSPOT_MIN_DENSITY_PCT: u32 = 45;

const LOG_CRITICAL: [&str; 3] = [
    "THREAT EXCEEDS PLATFORM LIMIT.",
    "EXECUTING STATION LOCKDOWN.",
    "MAPPING EMS CORRIDORS.",
];
const LOG_NOMINAL: [&str; 3] = [
    "MONITORING CORRIDOR FLOW.",
    "CAPACITY WITHIN SAFE LIMITS.",
    "NO INTERVENTION REQUIRED.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StationState {
    Open,
    LockedDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransitStatus {
    pub stadium_station: StationState,
    pub king_st: StationState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HotspotStatus {
    Normal,
    Elevated,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hotspot {
    pub corridor_id: String,
    pub density_pct: u32,
    pub status: HotspotStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurgeFrame {
    pub minute: Minute,
    pub time_label: String,
    pub game_state: GameState,
    pub threat_score: f64,
    pub estimated_crowd_volume: u32,
    pub predicted_surge_velocity: u32,
    pub critical_capacity_threshold: u32,
    pub platform_utilization_pct: u32,
    pub lock_down: bool,
    pub transit_status: TransitStatus,
    pub danger_routes: Vec<Route>,
    pub safe_routes: Vec<Route>,
    pub alert_message: String,
    pub severity: Severity,
    pub log_lines: Vec<String>,
    pub transit_load: BTreeMap<String, u32>,
    pub hotspots: Vec<Hotspot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurgeSummary {
    pub num_minutes: usize,
    pub num_simulations: usize,
    pub seed: u64,
    pub peak_surge_velocity: u32,
    pub peak_minute: Minute,
    pub mean_surge_velocity: f64,
    pub lockdown_minutes: usize,
    /// SHA-256 over the JSON-encoded surge curve.
    pub surge_checksum: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurgeExport {
    pub scenario_id: String,
    pub scenario_label: String,
    pub summary: SurgeSummary,
    pub timeline: Vec<SurgeFrame>,
}

pub fn utilization_pct(surge: u32, critical_threshold: u32) -> u32 {
    (surge as f64 / critical_threshold.max(1) as f64 * 100.0).round() as u32
}

pub fn is_lock_down(utilization_pct: u32, threat: f64) -> bool {
    utilization_pct >= LOCKDOWN_UTILIZATION_PCT || threat >= LOCKDOWN_THREAT
}

/// Routing severity raised to critical-band 4 for high threat.
pub fn export_severity(routing: Option<Severity>, threat: f64) -> Severity {
    let floor = if threat >= CRITICAL_SEVERITY_THREAT {
        Severity::ELEVATED
    } else {
        Severity::CALM
    };
    routing.map_or(floor, |s| s.max(floor))
}

fn hotspots(transit_load: &BTreeMap<String, u32>, critical_threshold: u32) -> Vec<Hotspot> {
    transit_load
        .iter()
        .filter_map(|(id, load)| {
            let density_pct = utilization_pct(*load, critical_threshold);
            if density_pct < HOTSPOT_MIN_DENSITY_PCT {
                return None;
            }
            let status = if density_pct >= 100 {
                HotspotStatus::Critical
            } else if density_pct >= 75 {
                HotspotStatus::Elevated
            } else {
                HotspotStatus::Normal
            };
            Some(Hotspot {
                corridor_id: id.clone(),
                density_pct,
                status,
            })
        })
        .collect()
}

const REROUTE_DANGER: [&str; 1] = ["route_stadium_1st_ave"];
const REROUTE_SAFE: [&str; 2] = ["route_king_street", "route_4th_ave_s"];

/// Standard reroute entries from the catalog, skipping any id already
/// listed on the opposite side so the two sets stay disjoint.
fn reroute_defaults(catalog: &RouteCatalog, ids: &[&str], opposite: &[Route]) -> Vec<Route> {
    ids.iter()
        .filter(|id| !opposite.iter().any(|r| r.id == **id))
        .filter_map(|id| catalog.get(id).cloned())
        .collect()
}

/// Build the surge export for a cached scenario timeline.
pub fn build_surge_export(
    timeline: &ScenarioTimeline,
    cfg: &SurgeConfig,
    catalog: &RouteCatalog,
) -> Result<SurgeExport, PipelineError> {
    if timeline.source != TimelineSource::Cache {
        return Err(PipelineError::PreconditionFailed(format!(
            "no cached predictions for '{}'; run precompute first",
            timeline.scenario_id
        )));
    }

    let predictions: Vec<PredictionRecord> = timeline
        .timeline
        .iter()
        .map(|f| f.to_prediction(&timeline.scenario_id))
        .collect();
    let surge = simulate_surge_velocity(&predictions, cfg);
    let threshold = cfg.critical_capacity_threshold;

    let mut frames = Vec::with_capacity(timeline.timeline.len());
    for (frame, &predicted) in timeline.timeline.iter().zip(&surge) {
        let threat = frame.egress_threat_score;
        let util = utilization_pct(predicted, threshold);
        let lock_down = is_lock_down(util, threat);

        let mut danger_routes = frame.danger_routes.clone();
        let mut safe_routes = frame.safe_routes.clone();
        if lock_down {
            if danger_routes.is_empty() {
                danger_routes = reroute_defaults(catalog, &REROUTE_DANGER, &safe_routes);
            }
            if safe_routes.is_empty() {
                safe_routes = reroute_defaults(catalog, &REROUTE_SAFE, &danger_routes);
            }
        }

        let alert_message = match frame.alert_message.as_deref().filter(|m| !m.is_empty()) {
            Some(m) => m.to_string(),
            None if lock_down => "CRITICAL: Surge velocity exceeds platform limit. Execute reroute.".to_string(),
            None => "Normal operations.".to_string(),
        };
        let log_lines = if lock_down { LOG_CRITICAL } else { LOG_NOMINAL };

        frames.push(SurgeFrame {
            minute: frame.minute,
            time_label: frame.time_label.clone(),
            game_state: frame.game_state.clone(),
            threat_score: (threat * 1000.0).round() / 1000.0,
            estimated_crowd_volume: frame.estimated_crowd_volume,
            predicted_surge_velocity: predicted,
            critical_capacity_threshold: threshold,
            platform_utilization_pct: util,
            lock_down,
            transit_status: TransitStatus {
                stadium_station: if lock_down {
                    StationState::LockedDown
                } else {
                    StationState::Open
                },
                king_st: StationState::Open,
            },
            danger_routes,
            safe_routes,
            alert_message,
            severity: export_severity(frame.severity, threat),
            log_lines: log_lines.iter().map(|s| s.to_string()).collect(),
            transit_load: frame.transit_load.clone(),
            hotspots: hotspots(&frame.transit_load, threshold),
        });
    }

    let summary = summarize(&frames, &surge, cfg)?;
    Ok(SurgeExport {
        scenario_id: timeline.scenario_id.clone(),
        scenario_label: timeline.metadata.label.clone(),
        summary,
        timeline: frames,
    })
}

fn summarize(frames: &[SurgeFrame], surge: &[u32], cfg: &SurgeConfig) -> Result<SurgeSummary, PipelineError> {
    let mut stats = CurveStats::default();
    for f in frames {
        stats.add(f.minute, f.predicted_surge_velocity as f64);
    }
    let (peak_minute, peak) = stats.peak().unwrap_or((0, 0.0));

    let bytes = serde_json::to_vec(surge).map_err(|e| PipelineError::invalid("surge curve", e.to_string()))?;

    Ok(SurgeSummary {
        num_minutes: frames.len(),
        num_simulations: cfg.num_simulations,
        seed: cfg.seed,
        peak_surge_velocity: peak as u32,
        peak_minute,
        mean_surge_velocity: stats.mean(),
        lockdown_minutes: frames.iter().filter(|f| f.lock_down).count(),
        surge_checksum: sha256_hex(&bytes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ScenarioRegistry;
    use crate::timeline::{assemble_timeline, generate_synthetic_timeline};
    use crate::cache::ScenarioRows;
    use crate::types::{all_minutes, GameSnapshot, PredictionRecord};

    fn cached_timeline(threat_at: impl Fn(Minute) -> f64) -> ScenarioTimeline {
        let scenario = ScenarioRegistry::builtin()
            .get("scenario_c_blowout_q3")
            .unwrap()
            .clone();
        let rows = ScenarioRows {
            corridor_loads: Vec::new(),
            predictions: all_minutes()
                .map(|minute| {
                    let threat = threat_at(minute);
                    PredictionRecord {
                        scenario_id: scenario.id.clone(),
                        minute,
                        threat_score: threat,
                        crowd_volume: (threat * 68_000.0).round() as u32,
                        game_state: GameState::InEvent(GameSnapshot::pregame()),
                    }
                })
                .collect(),
            routing_decisions: Vec::new(),
        };
        ScenarioTimeline {
            scenario_id: scenario.id.clone(),
            metadata: scenario,
            source: TimelineSource::Cache,
            timeline: assemble_timeline(&rows),
        }
    }

    fn small_cfg() -> SurgeConfig {
        SurgeConfig {
            num_simulations: 500,
            ..SurgeConfig::default()
        }
    }

    #[test]
    fn utilization_and_lockdown_thresholds() {
        assert_eq!(utilization_pct(133, 133), 100);
        assert_eq!(utilization_pct(146, 133), 110);
        assert!(is_lock_down(110, 0.0));
        assert!(!is_lock_down(109, 0.91));
        assert!(is_lock_down(0, 0.92));
    }

    #[test]
    fn severity_floor_for_high_threat() {
        assert_eq!(export_severity(None, 0.2), Severity::CALM);
        assert_eq!(export_severity(None, 0.85), Severity::ELEVATED);
        assert_eq!(export_severity(Some(Severity::CRITICAL), 0.9), Severity::CRITICAL);
        assert_eq!(export_severity(Some(Severity::CALM), 0.9), Severity::ELEVATED);
    }

    #[test]
    fn synthetic_timeline_is_rejected() {
        let registry = ScenarioRegistry::builtin();
        let scenario = registry.get("scenario_a_normal_exit").unwrap().clone();
        let catalog = RouteCatalog::builtin();
        let t = ScenarioTimeline {
            scenario_id: scenario.id.clone(),
            timeline: generate_synthetic_timeline(&scenario, &catalog),
            metadata: scenario,
            source: TimelineSource::Synthetic,
        };
        let err = build_surge_export(&t, &small_cfg(), &catalog).unwrap_err();
        assert!(matches!(err, PipelineError::PreconditionFailed(_)));
    }

    #[test]
    fn high_threat_minutes_lock_down_with_standard_reroute() {
        let t = cached_timeline(|m| if m == 600 { 0.95 } else { 0.0 });
        let catalog = RouteCatalog::builtin();
        let export = build_surge_export(&t, &small_cfg(), &catalog).unwrap();
        assert_eq!(export.timeline.len(), 1440);

        let f = &export.timeline[600];
        assert!(f.lock_down);
        assert_eq!(f.transit_status.stadium_station, StationState::LockedDown);
        assert_eq!(f.danger_routes[0].id, "route_stadium_1st_ave");
        let safe: Vec<&str> = f.safe_routes.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(safe, vec!["route_king_street", "route_4th_ave_s"]);
        assert_eq!(f.severity, Severity::ELEVATED);

        let calm = &export.timeline[100];
        assert!(!calm.lock_down);
        assert!(calm.danger_routes.is_empty());
        assert_eq!(calm.alert_message, "Normal operations.");
        assert!(export.summary.lockdown_minutes >= 1);
    }

    #[test]
    fn lockdown_reroute_never_lists_a_route_on_both_sides() {
        let catalog = RouteCatalog::builtin();
        let mut t = cached_timeline(|m| if m == 1200 { 0.95 } else { 0.0 });
        let king = catalog.get("route_king_street").unwrap().clone();
        t.timeline[1200].danger_routes = vec![king];
        t.timeline[1200].alert_message = Some("King Street blocked.".to_string());

        let export = build_surge_export(&t, &small_cfg(), &catalog).unwrap();
        let f = &export.timeline[1200];
        assert!(f.lock_down);
        let danger: Vec<&str> = f.danger_routes.iter().map(|r| r.id.as_str()).collect();
        let safe: Vec<&str> = f.safe_routes.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(danger, vec!["route_king_street"]);
        assert_eq!(safe, vec!["route_4th_ave_s"]);
        assert_eq!(f.alert_message, "King Street blocked.");
    }

    #[test]
    fn export_is_reproducible() {
        let t = cached_timeline(|m| (m as f64 / 1440.0).min(1.0));
        let catalog = RouteCatalog::builtin();
        let a = build_surge_export(&t, &small_cfg(), &catalog).unwrap();
        let b = build_surge_export(&t, &small_cfg(), &catalog).unwrap();
        assert_eq!(a.summary.surge_checksum, b.summary.surge_checksum);
        assert_eq!(a, b);

        let other = SurgeConfig {
            seed: 7,
            ..small_cfg()
        };
        let c = build_surge_export(&t, &other, &catalog).unwrap();
        assert_ne!(a.summary.surge_checksum, c.summary.surge_checksum);
    }
}
