// src/games.rs
//
// Game-state source.
//
// Play-by-play records are mapped from game clock to wall-clock minutes:
//
//   first half  (3600 -> 1800 game seconds) : kickoff .. kickoff + 65
//   halftime                                : 20 minutes, no plays
//   second half (1800 -> 0 game seconds)    : next 65 minutes
//
// The last play at or before a minute is carried forward. Inside the window
// and before the first mapped play the snapshot is "Q1 15:00 0-0 Pre-game";
// outside the window there is no active game.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{read_to_string, PipelineError};
use crate::types::{all_minutes, GameSnapshot, GameState, Minute, MINUTES_PER_DAY};

/// Real minutes per half, stoppages included.
pub const HALF_DURATION_MINUTES: u16 = 65;
pub const HALFTIME_MINUTES: u16 = 20;
pub const GAME_SECONDS: f64 = 3600.0;
const HALF_SECONDS: f64 = 1800.0;
const MAX_PLAY_CHARS: usize = 120;

/// One play-by-play row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayRecord {
    pub game_seconds_remaining: f64,
    pub quarter: u8,
    /// `M:SS` or `M:SS:00`.
    pub clock: String,
    pub home_score: u32,
    pub away_score: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub momentum_raw: Option<f64>,
}

/// Last wall minute of the game window for a given kickoff.
pub fn game_end_minute(kickoff: Minute) -> Minute {
    kickoff + 2 * HALF_DURATION_MINUTES + HALFTIME_MINUTES
}

/// Map game seconds remaining to a wall minute, clamped to the game window.
pub fn game_seconds_to_wall_minute(game_secs: f64, kickoff: Minute) -> Minute {
    let secs = game_secs.clamp(0.0, GAME_SECONDS);
    let half = HALF_DURATION_MINUTES as f64;
    let minute = if secs > HALF_SECONDS {
        kickoff as f64 + ((GAME_SECONDS - secs) / HALF_SECONDS * half).floor()
    } else {
        let second_half_start = (kickoff + HALF_DURATION_MINUTES + HALFTIME_MINUTES) as f64;
        second_half_start + ((HALF_SECONDS - secs) / HALF_SECONDS * half).floor()
    };
    (minute as Minute).clamp(kickoff, game_end_minute(kickoff))
}

/// Normalise `8:22`, `08:22` or `8:22:00` to `M:SS` plus seconds on the clock.
/// Unparseable clocks read as a full quarter.
pub fn normalize_clock(raw: &str) -> (String, u32) {
    let parts: Vec<&str> = raw.trim().split(':').collect();
    if parts.len() >= 2 {
        if let (Ok(m), Ok(s)) = (parts[0].parse::<u32>(), parts[1].parse::<u32>()) {
            return (format!("{m}:{s:02}"), m * 60 + s);
        }
    }
    if raw.trim().is_empty() {
        return ("0:00".to_string(), 0);
    }
    (raw.trim().to_string(), 900)
}

fn snapshot_from_play(play: &PlayRecord) -> GameSnapshot {
    let (clock, clock_seconds_remaining) = normalize_clock(&play.clock);
    let summary: Option<String> = play
        .description
        .as_deref()
        .map(|d| d.chars().take(MAX_PLAY_CHARS).collect::<String>())
        .filter(|d| !d.is_empty());
    GameSnapshot {
        quarter: play.quarter,
        clock,
        clock_seconds_remaining,
        home: play.home_score,
        away: play.away_score,
        score_diff: Some(play.home_score as i32 - play.away_score as i32),
        play: summary,
        momentum_raw: play.momentum_raw,
    }
}

/// Full 1440-minute game-state map for one scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct GameTimeline {
    states: Vec<GameState>,
    mapped_minutes: usize,
}

impl GameTimeline {
    pub fn from_plays(plays: &[PlayRecord], kickoff: Minute) -> Self {
        let mut ordered: Vec<&PlayRecord> = plays
            .iter()
            .filter(|p| p.game_seconds_remaining.is_finite())
            .collect();
        ordered.sort_by(|a, b| b.game_seconds_remaining.total_cmp(&a.game_seconds_remaining));

        let mut by_minute: BTreeMap<Minute, GameSnapshot> = BTreeMap::new();
        for play in ordered {
            let minute = game_seconds_to_wall_minute(play.game_seconds_remaining, kickoff);
            by_minute.insert(minute, snapshot_from_play(play));
        }

        let end = game_end_minute(kickoff);
        let mut states = Vec::with_capacity(MINUTES_PER_DAY);
        let mut last: Option<&GameSnapshot> = None;
        for minute in all_minutes() {
            if let Some(s) = by_minute.get(&minute) {
                last = Some(s);
            }
            let state = if minute < kickoff || minute > end {
                GameState::NoActiveGame
            } else {
                GameState::InEvent(last.cloned().unwrap_or_else(GameSnapshot::pregame))
            };
            states.push(state);
        }

        Self {
            states,
            mapped_minutes: by_minute.len(),
        }
    }

    pub fn state_at(&self, minute: Minute) -> GameState {
        self.states
            .get(minute as usize)
            .cloned()
            .unwrap_or_default()
    }

    /// Distinct wall minutes that received at least one play.
    pub fn mapped_minutes(&self) -> usize {
        self.mapped_minutes
    }

    /// Final snapshot of the game, if any minute was active.
    pub fn final_state(&self) -> Option<&GameSnapshot> {
        self.states.iter().rev().find_map(GameState::snapshot)
    }
}

/// Per (scenario, minute) game-state lookup.
pub trait GameStateSource {
    fn has_scenario(&self, scenario_id: &str) -> bool;

    /// `NoActiveGame` outside the event window or for unknown scenarios.
    fn state_at(&self, scenario_id: &str, minute: Minute) -> GameState;
}

/// Game-state source backed by play-by-play records.
#[derive(Debug, Clone, Default)]
pub struct PlayByPlaySource {
    timelines: BTreeMap<String, GameTimeline>,
}

impl PlayByPlaySource {
    pub fn from_plays(plays: &BTreeMap<String, Vec<PlayRecord>>, kickoff: Minute) -> Self {
        let timelines = plays
            .iter()
            .map(|(id, p)| (id.clone(), GameTimeline::from_plays(p, kickoff)))
            .collect();
        Self { timelines }
    }

    /// Load `{ "<scenario_id>": [PlayRecord, ...], ... }` JSON.
    pub fn from_json_file<P: AsRef<Path>>(path: P, kickoff: Minute) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let contents = read_to_string(path)?;
        let plays: BTreeMap<String, Vec<PlayRecord>> =
            serde_json::from_str(&contents).map_err(|e| PipelineError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(Self::from_plays(&plays, kickoff))
    }

    /// Scripted games for the three built-in scenarios.
    pub fn builtin(kickoff: Minute) -> Self {
        Self::from_plays(&builtin_plays(), kickoff)
    }

    pub fn timeline(&self, scenario_id: &str) -> Option<&GameTimeline> {
        self.timelines.get(scenario_id)
    }
}

impl GameStateSource for PlayByPlaySource {
    fn has_scenario(&self, scenario_id: &str) -> bool {
        self.timelines.contains_key(scenario_id)
    }

    fn state_at(&self, scenario_id: &str, minute: Minute) -> GameState {
        self.timelines
            .get(scenario_id)
            .map(|t| t.state_at(minute))
            .unwrap_or_default()
    }
}

/// Build a play from game seconds; quarter and clock are derived.
fn scripted(secs: u32, home: u32, away: u32, desc: &str) -> PlayRecord {
    let secs = secs.min(3600);
    let quarter = if secs == 0 { 4 } else { ((3600 - secs) / 900 + 1).min(4) };
    let clock_secs = secs - (4 - quarter as u32) * 900;
    PlayRecord {
        game_seconds_remaining: secs as f64,
        quarter: quarter as u8,
        clock: format!("{}:{:02}", clock_secs / 60, clock_secs % 60),
        home_score: home,
        away_score: away,
        description: Some(desc.to_string()),
        momentum_raw: None,
    }
}

fn builtin_plays() -> BTreeMap<String, Vec<PlayRecord>> {
    let mut out = BTreeMap::new();

    // SEA 24-13 DAL: comfortable home win.
    out.insert(
        "scenario_a_normal_exit".to_string(),
        vec![
            scripted(3600, 0, 0, "Opening kickoff"),
            scripted(3120, 7, 0, "SEA touchdown pass, extra point good"),
            scripted(2700, 7, 3, "DAL 41-yard field goal good"),
            scripted(2250, 14, 3, "SEA rushing touchdown, extra point good"),
            scripted(1850, 14, 6, "DAL 38-yard field goal good"),
            scripted(1800, 14, 6, "Second-half kickoff"),
            scripted(1300, 17, 6, "SEA 45-yard field goal good"),
            scripted(700, 17, 13, "DAL touchdown pass, extra point good"),
            scripted(240, 24, 13, "SEA touchdown run, extra point good"),
            scripted(0, 24, 13, "End of game"),
        ],
    );

    // SEA 40-38 HOU: lead changes to the final minute.
    out.insert(
        "scenario_b_close_game".to_string(),
        vec![
            scripted(3600, 0, 0, "Opening kickoff"),
            scripted(3300, 0, 7, "HOU touchdown pass, extra point good"),
            scripted(3000, 7, 7, "SEA touchdown pass, extra point good"),
            scripted(2600, 7, 14, "HOU interception returned for touchdown"),
            scripted(2300, 14, 14, "SEA rushing touchdown, extra point good"),
            scripted(2000, 14, 21, "HOU touchdown pass, extra point good"),
            scripted(1850, 21, 21, "SEA touchdown pass, extra point good"),
            scripted(1800, 21, 21, "Second-half kickoff"),
            scripted(1500, 21, 24, "HOU 33-yard field goal good"),
            scripted(1100, 28, 24, "SEA touchdown pass, extra point good"),
            scripted(800, 28, 31, "HOU touchdown run, extra point good"),
            scripted(500, 31, 31, "SEA 48-yard field goal good"),
            scripted(300, 31, 38, "HOU touchdown pass, extra point good"),
            scripted(120, 34, 38, "SEA 52-yard field goal good"),
            scripted(21, 40, 38, "SEA touchdown pass, two-point attempt fails"),
            scripted(0, 40, 38, "End of game"),
        ],
    );

    // SEA 7-42 LA: down 0-34 at the half.
    out.insert(
        "scenario_c_blowout_q3".to_string(),
        vec![
            scripted(3600, 0, 0, "Opening kickoff"),
            scripted(3200, 0, 7, "LA touchdown run, extra point good"),
            scripted(2900, 0, 14, "LA touchdown pass, extra point good"),
            scripted(2500, 0, 21, "LA fumble recovery returned for touchdown"),
            scripted(2100, 0, 27, "LA touchdown run, extra point blocked"),
            scripted(1900, 0, 34, "LA touchdown pass, extra point good"),
            scripted(1800, 0, 34, "Second-half kickoff"),
            scripted(1500, 0, 42, "LA touchdown pass, two-point conversion good"),
            scripted(400, 7, 42, "SEA touchdown pass, extra point good"),
            scripted(0, 7, 42, "End of game"),
        ],
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const KICKOFF: Minute = 1110;

    #[test]
    fn wall_minute_mapping() {
        assert_eq!(game_seconds_to_wall_minute(3600.0, KICKOFF), 1110);
        assert_eq!(game_seconds_to_wall_minute(1801.0, KICKOFF), 1174);
        assert_eq!(game_seconds_to_wall_minute(1800.0, KICKOFF), 1195);
        assert_eq!(game_seconds_to_wall_minute(0.0, KICKOFF), 1260);
        // Overtime clamps to the final whistle.
        assert_eq!(game_seconds_to_wall_minute(-300.0, KICKOFF), 1260);
        assert_eq!(game_end_minute(KICKOFF), 1260);
    }

    #[test]
    fn clock_normalisation() {
        assert_eq!(normalize_clock("08:22"), ("8:22".to_string(), 502));
        assert_eq!(normalize_clock("8:22:00"), ("8:22".to_string(), 502));
        assert_eq!(normalize_clock(""), ("0:00".to_string(), 0));
        assert_eq!(normalize_clock("END").1, 900);
    }

    #[test]
    fn window_and_forward_fill() {
        let plays = vec![scripted(3000, 7, 0, "TD")];
        let t = GameTimeline::from_plays(&plays, KICKOFF);
        assert_eq!(t.state_at(1109), GameState::NoActiveGame);
        assert_eq!(t.state_at(1261), GameState::NoActiveGame);

        // 600 s into the game -> 1110 + floor(600/1800*65) = 1131.
        let pre = t.state_at(1130);
        assert_eq!(pre.snapshot().unwrap().play.as_deref(), Some("Pre-game"));
        let live = t.state_at(1131);
        assert_eq!(live.snapshot().unwrap().home, 7);
        let later = t.state_at(1260);
        assert_eq!(later.snapshot().unwrap().home, 7);
        assert_eq!(t.mapped_minutes(), 1);
    }

    #[test]
    fn long_descriptions_truncated() {
        let mut p = scripted(3600, 0, 0, "");
        p.description = Some("x".repeat(300));
        let t = GameTimeline::from_plays(&[p], KICKOFF);
        let s = t.state_at(1110);
        assert_eq!(s.snapshot().unwrap().play.as_ref().unwrap().len(), 120);
    }

    #[test]
    fn builtin_finals() {
        let src = PlayByPlaySource::builtin(KICKOFF);
        let final_of = |id: &str| {
            let s = src.timeline(id).unwrap().final_state().unwrap().clone();
            (s.home, s.away)
        };
        assert_eq!(final_of("scenario_a_normal_exit"), (24, 13));
        assert_eq!(final_of("scenario_b_close_game"), (40, 38));
        assert_eq!(final_of("scenario_c_blowout_q3"), (7, 42));
        assert!(!src.has_scenario("scenario_z"));
        assert_eq!(src.state_at("scenario_z", 1200), GameState::NoActiveGame);
    }

    #[test]
    fn blowout_at_half() {
        let src = PlayByPlaySource::builtin(KICKOFF);
        // Halftime minutes carry the last first-half play.
        let s = src.state_at("scenario_c_blowout_q3", 1185);
        assert_eq!(s.score_diff(), -34);
    }

    #[test]
    fn scripted_derives_quarter_and_clock() {
        let p = scripted(2250, 0, 0, "");
        assert_eq!((p.quarter, p.clock.as_str()), (2, "7:30"));
        let p = scripted(0, 0, 0, "");
        assert_eq!((p.quarter, p.clock.as_str()), (4, "0:00"));
    }
}
