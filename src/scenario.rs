// src/scenario.rs
//
// Scenario definitions.
//
// A scenario is an immutable, configuration-time description of one event
// day: identity, display label, attendance and a profile tag that selects the
// egress multiplier tuning. Scenario sets can be loaded from YAML:
//
//   schema_version: 1
//   scenarios:
//     - id: scenario_c_blowout_q3
//       label: "Scenario C: Blowout"
//       attendance: 68000
//       profile: blowout_q3_home_losing_21plus
//       egress:                 # optional override of the profile tuning
//         pregame_peak: 3.0
//         during_game_level: 0.5
//         postgame_peak: 7.0
//         postgame_decay_minutes: 75
//         early_exit_minute: 1200

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{read_to_string, PipelineError};
use crate::types::{Minute, MINUTES_PER_DAY};

/// Current scenario-set schema version.
pub const SCENARIO_SCHEMA_VERSION: u32 = 1;

/// Profile tag selecting synthesizer (and narrative) tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProfileTag {
    #[serde(rename = "normal_exit")]
    NormalExit,
    #[serde(rename = "high_attendance_close_game")]
    HighAttendanceCloseGame,
    #[serde(rename = "blowout_q3_home_losing_21plus")]
    BlowoutQ3,
}

impl ProfileTag {
    /// Stable name (used in logs and YAML).
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileTag::NormalExit => "normal_exit",
            ProfileTag::HighAttendanceCloseGame => "high_attendance_close_game",
            ProfileTag::BlowoutQ3 => "blowout_q3_home_losing_21plus",
        }
    }

    /// Parse a profile name (case-insensitive, short aliases allowed).
    pub fn parse(s: &str) -> Option<ProfileTag> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal_exit" | "normal" => Some(ProfileTag::NormalExit),
            "high_attendance_close_game" | "close_game" | "close" => {
                Some(ProfileTag::HighAttendanceCloseGame)
            }
            "blowout_q3_home_losing_21plus" | "blowout" => Some(ProfileTag::BlowoutQ3),
            _ => None,
        }
    }

    /// Default egress multiplier tuning for this profile.
    pub fn egress_profile(&self) -> EgressProfile {
        match self {
            ProfileTag::NormalExit => EgressProfile {
                pregame_peak: 2.0,
                during_game_level: 0.6,
                postgame_peak: 3.5,
                postgame_decay_minutes: 60,
                early_exit_minute: None,
            },
            ProfileTag::HighAttendanceCloseGame => EgressProfile {
                pregame_peak: 3.0,
                during_game_level: 0.5,
                postgame_peak: 6.0,
                postgame_decay_minutes: 45,
                early_exit_minute: None,
            },
            // 20:00 - Q3 blowout triggers the mass exodus.
            ProfileTag::BlowoutQ3 => EgressProfile {
                pregame_peak: 3.0,
                during_game_level: 0.5,
                postgame_peak: 7.0,
                postgame_decay_minutes: 75,
                early_exit_minute: Some(20 * 60),
            },
        }
    }
}

/// Four-phase event multiplier parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EgressProfile {
    pub pregame_peak: f64,
    pub during_game_level: f64,
    pub postgame_peak: f64,
    pub postgame_decay_minutes: u32,
    #[serde(default)]
    pub early_exit_minute: Option<Minute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub teams: String,
    pub attendance: u32,
    pub profile: ProfileTag,
    /// Explicit tuning; falls back to the profile's defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub egress: Option<EgressProfile>,
}

impl Scenario {
    pub fn egress_profile(&self) -> EgressProfile {
        self.egress.unwrap_or_else(|| self.profile.egress_profile())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScenarioFile {
    schema_version: u32,
    scenarios: Vec<Scenario>,
}

/// Ordered, validated set of scenarios.
#[derive(Debug, Clone)]
pub struct ScenarioRegistry {
    scenarios: Vec<Scenario>,
}

impl ScenarioRegistry {
    /// The three match-day scenarios shipped with the venue.
    pub fn builtin() -> Self {
        let scenarios = vec![
            Scenario {
                id: "scenario_a_normal_exit".to_string(),
                label: "Scenario A: Normal Exit".to_string(),
                date: "2026-06-15".to_string(),
                teams: "Matchday Group Stage".to_string(),
                attendance: 59_000,
                profile: ProfileTag::NormalExit,
                egress: None,
            },
            Scenario {
                id: "scenario_b_close_game".to_string(),
                label: "Scenario B: High Attendance / Close Game".to_string(),
                date: "2026-06-20".to_string(),
                teams: "Quarter-Final".to_string(),
                attendance: 68_000,
                profile: ProfileTag::HighAttendanceCloseGame,
                egress: None,
            },
            Scenario {
                id: "scenario_c_blowout_q3".to_string(),
                label: "Scenario C: Blowout".to_string(),
                date: "2026-06-25".to_string(),
                teams: "Quarter-Final".to_string(),
                attendance: 68_000,
                profile: ProfileTag::BlowoutQ3,
                egress: None,
            },
        ];
        Self { scenarios }
    }

    pub fn new(scenarios: Vec<Scenario>) -> Result<Self, PipelineError> {
        let reg = Self { scenarios };
        reg.validate()?;
        Ok(reg)
    }

    /// Load a scenario set from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let contents = read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents).map_err(|e| match e {
            PipelineError::Parse { message, .. } => PipelineError::Parse {
                path: path.as_ref().display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Parse a scenario set from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PipelineError> {
        let file: ScenarioFile = serde_yaml::from_str(yaml).map_err(|e| PipelineError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        if file.schema_version != SCENARIO_SCHEMA_VERSION {
            return Err(PipelineError::invalid(
                "schema_version",
                format!(
                    "expected {SCENARIO_SCHEMA_VERSION}, found {}",
                    file.schema_version
                ),
            ));
        }
        Self::new(file.scenarios)
    }

    /// Validate every scenario and the uniqueness of ids.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.scenarios.is_empty() {
            return Err(PipelineError::invalid("scenarios", "at least one scenario required"));
        }
        let mut seen = HashSet::new();
        for s in &self.scenarios {
            if s.id.trim().is_empty() {
                return Err(PipelineError::invalid("scenario.id", "id cannot be empty"));
            }
            if !seen.insert(s.id.as_str()) {
                return Err(PipelineError::invalid(
                    "scenario.id",
                    format!("duplicate scenario id '{}'", s.id),
                ));
            }
            if s.attendance == 0 {
                return Err(PipelineError::invalid(
                    format!("{}.attendance", s.id),
                    "attendance must be > 0",
                ));
            }
            let egress = s.egress_profile();
            if egress.postgame_decay_minutes == 0 {
                return Err(PipelineError::invalid(
                    format!("{}.egress.postgame_decay_minutes", s.id),
                    "postgame_decay_minutes must be > 0",
                ));
            }
            let levels = [
                egress.pregame_peak,
                egress.during_game_level,
                egress.postgame_peak,
            ];
            if levels.iter().any(|v| !v.is_finite() || *v <= 0.0) {
                return Err(PipelineError::invalid(
                    format!("{}.egress", s.id),
                    "multiplier levels must be finite and > 0",
                ));
            }
            if let Some(m) = egress.early_exit_minute {
                if m as usize >= MINUTES_PER_DAY {
                    return Err(PipelineError::invalid(
                        format!("{}.egress.early_exit_minute", s.id),
                        "early_exit_minute must be < 1440",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Look up a scenario by id.
    pub fn get(&self, scenario_id: &str) -> Result<&Scenario, PipelineError> {
        self.scenarios
            .iter()
            .find(|s| s.id == scenario_id)
            .ok_or_else(|| PipelineError::UnknownScenario(scenario_id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_is_valid() {
        let reg = ScenarioRegistry::builtin();
        reg.validate().expect("builtin scenarios validate");
        assert_eq!(reg.len(), 3);
        let c = reg.get("scenario_c_blowout_q3").unwrap();
        assert_eq!(c.egress_profile().early_exit_minute, Some(1200));
    }

    #[test]
    fn unknown_scenario_is_not_found() {
        let reg = ScenarioRegistry::builtin();
        let err = reg.get("scenario_z").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn parse_yaml_with_override() {
        let yaml = r#"
schema_version: 1
scenarios:
  - id: derby
    label: "Derby Day"
    attendance: 50000
    profile: close_game
    egress:
      pregame_peak: 2.5
      during_game_level: 0.4
      postgame_peak: 5.0
      postgame_decay_minutes: 30
"#;
        // Aliases are accepted by ProfileTag::parse, not by serde.
        assert!(ScenarioRegistry::from_yaml_str(yaml).is_err());

        let yaml = yaml.replace("profile: close_game", "profile: high_attendance_close_game");
        let reg = ScenarioRegistry::from_yaml_str(&yaml).expect("should parse");
        let s = reg.get("derby").unwrap();
        assert_eq!(s.egress_profile().postgame_decay_minutes, 30);
        assert_eq!(s.egress_profile().early_exit_minute, None);
    }

    #[test]
    fn duplicate_ids_rejected() {
        let mut scenarios: Vec<Scenario> = ScenarioRegistry::builtin().iter().cloned().collect();
        scenarios.push(scenarios[0].clone());
        assert!(ScenarioRegistry::new(scenarios).is_err());
    }

    #[test]
    fn zero_decay_rejected() {
        let yaml = r#"
schema_version: 1
scenarios:
  - id: x
    label: X
    attendance: 10
    profile: normal_exit
    egress:
      pregame_peak: 2.0
      during_game_level: 0.6
      postgame_peak: 3.5
      postgame_decay_minutes: 0
"#;
        assert!(ScenarioRegistry::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn profile_tag_parse_aliases() {
        assert_eq!(ProfileTag::parse("Blowout"), Some(ProfileTag::BlowoutQ3));
        assert_eq!(ProfileTag::parse("normal"), Some(ProfileTag::NormalExit));
        assert_eq!(ProfileTag::parse("??"), None);
    }
}
