// src/types.rs
//
// Common shared types for the CrowdShield egress pipeline.

use serde::{Deserialize, Serialize};

/// Number of minutes in the fixed forecasting horizon.
pub const MINUTES_PER_DAY: usize = 1440;

/// Minute-of-day index in `[0, 1440)`.
pub type Minute = u16;

/// `[lat, lng]` pair, serialized as a two-element array.
pub type GeoPoint = [f64; 2];

/// Format a minute-of-day as `HH:MM`.
pub fn minute_label(minute: Minute) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// Iterate the full minute domain in increasing order.
pub fn all_minutes() -> impl Iterator<Item = Minute> {
    (0..MINUTES_PER_DAY as u32).map(|m| m as Minute)
}

/// Pedestrian route from the external catalog.
///
/// The pipeline only ever copies catalog entries by id; paths are never
/// constructed or modified downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub label: String,
    pub corridor: String,
    pub path: Vec<GeoPoint>,
}

/// In-event game snapshot. Field names follow the play-by-play export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub quarter: u8,
    /// Display clock, `M:SS`.
    pub clock: String,
    pub clock_seconds_remaining: u32,
    pub home: u32,
    pub away: u32,
    /// Explicit differential when the source provides one; otherwise derived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_diff: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub play: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub momentum_raw: Option<f64>,
}

impl GameSnapshot {
    /// Home minus away, preferring the explicit field.
    pub fn score_diff(&self) -> i32 {
        self.score_diff
            .unwrap_or(self.home as i32 - self.away as i32)
    }

    /// Placeholder state used between kickoff and the first mapped play.
    pub fn pregame() -> Self {
        Self {
            quarter: 1,
            clock: "15:00".to_string(),
            clock_seconds_remaining: 900,
            home: 0,
            away: 0,
            score_diff: Some(0),
            play: Some("Pre-game".to_string()),
            momentum_raw: None,
        }
    }
}

/// Game state for a single minute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GameState {
    /// Outside the event window.
    #[default]
    NoActiveGame,
    InEvent(GameSnapshot),
}

impl GameState {
    pub fn snapshot(&self) -> Option<&GameSnapshot> {
        match self {
            GameState::NoActiveGame => None,
            GameState::InEvent(s) => Some(s),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, GameState::InEvent(_))
    }

    /// Score differential, 0 when no game is active.
    pub fn score_diff(&self) -> i32 {
        self.snapshot().map(GameSnapshot::score_diff).unwrap_or(0)
    }

    /// Quarter number, 0 when no game is active.
    pub fn quarter(&self) -> u8 {
        self.snapshot().map(|s| s.quarter).unwrap_or(0)
    }

    /// One-line summary used in advisory prompts and logs.
    pub fn summary(&self) -> String {
        match self {
            GameState::NoActiveGame => "No active game".to_string(),
            GameState::InEvent(s) => {
                let mut out = format!(
                    "Q{} {} - Home {} vs Away {}",
                    s.quarter, s.clock, s.home, s.away
                );
                if let Some(play) = s.play.as_deref().filter(|p| !p.is_empty()) {
                    let short: String = play.chars().take(120).collect();
                    out.push_str(" | Last play: ");
                    out.push_str(&short);
                }
                out
            }
        }
    }
}

/// Alert severity in `[1, 5]` (5 = critical).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Severity(u8);

impl Severity {
    pub const CALM: Severity = Severity(1);
    pub const ELEVATED: Severity = Severity(4);
    pub const CRITICAL: Severity = Severity(5);

    pub fn new(level: u8) -> Option<Self> {
        (1..=5).contains(&level).then_some(Severity(level))
    }

    pub fn level(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Severity::new(value).ok_or_else(|| format!("severity {value} outside [1, 5]"))
    }
}

impl From<Severity> for u8 {
    fn from(value: Severity) -> Self {
        value.0
    }
}

/// One row per (scenario, minute, corridor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorridorLoadRecord {
    pub scenario_id: String,
    pub minute: Minute,
    pub corridor_id: String,
    pub pedestrian_volume: u32,
    pub transit_load: u32,
}

/// One row per (scenario, minute).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub scenario_id: String,
    pub minute: Minute,
    pub threat_score: f64,
    pub crowd_volume: u32,
    pub game_state: GameState,
}

/// Sparse: present only for minutes where routing was triggered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecisionRecord {
    pub scenario_id: String,
    pub minute: Minute,
    pub danger_routes: Vec<Route>,
    pub safe_routes: Vec<Route>,
    pub alert_message: String,
    pub severity: Severity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minute_labels() {
        assert_eq!(minute_label(0), "00:00");
        assert_eq!(minute_label(1110), "18:30");
        assert_eq!(minute_label(1439), "23:59");
    }

    #[test]
    fn score_diff_prefers_explicit_field() {
        let mut s = GameSnapshot::pregame();
        s.home = 7;
        s.away = 42;
        s.score_diff = None;
        assert_eq!(s.score_diff(), -35);
        s.score_diff = Some(-3);
        assert_eq!(s.score_diff(), -3);
    }

    #[test]
    fn game_state_serializes_with_status_tag() {
        let none = serde_json::to_value(GameState::NoActiveGame).unwrap();
        assert_eq!(none["status"], "no_active_game");

        let live = GameState::InEvent(GameSnapshot::pregame());
        let v = serde_json::to_value(&live).unwrap();
        assert_eq!(v["status"], "in_event");
        assert_eq!(v["quarter"], 1);
        let back: GameState = serde_json::from_value(v).unwrap();
        assert_eq!(back, live);
    }

    #[test]
    fn severity_bounds() {
        assert!(Severity::new(0).is_none());
        assert!(Severity::new(6).is_none());
        assert_eq!(Severity::new(3).map(Severity::level), Some(3));
        assert!(serde_json::from_str::<Severity>("9").is_err());
    }
}
