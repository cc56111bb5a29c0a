// src/synth.rs
//
// Corridor load synthesizer.
//
// Combines the normalised daily profile with each corridor's weekday volume
// and a four-phase event multiplier to produce one load row per
// (scenario, minute, corridor):
//
//   quiet    : 1.0 until the arrival window opens
//   arrival  : 1.0 -> pregame_peak over the arrival window
//   in-event : pregame_peak -> during_game_level over the settle time, then hold
//   egress   : during_game_level -> postgame_peak over the first part of the
//              decay window, then back to 1.0
//
// Every deviation from 1.0 is scaled by the corridor's proximity. Output is a
// pure function of its inputs.

use crate::config::VenueConfig;
use crate::corridor::{Corridor, CorridorTable};
use crate::profile::DailyProfile;
use crate::scenario::{EgressProfile, Scenario};
use crate::types::{all_minutes, CorridorLoadRecord, Minute};

/// Half-cosine ease from 0 to 1; `t` is clamped to [0, 1].
pub fn smooth(t: f64) -> f64 {
    0.5 * (1.0 - (std::f64::consts::PI * t.clamp(0.0, 1.0)).cos())
}

/// Traffic multiplier at `minute` for a corridor with the given proximity.
pub fn event_multiplier(
    minute: Minute,
    venue: &VenueConfig,
    egress: &EgressProfile,
    proximity: f64,
) -> f64 {
    let m = minute as f64;
    let kickoff = venue.kickoff_minute as f64;
    let arrival_window = venue.arrival_window_minutes.max(1) as f64;
    let settle = venue.settle_minutes.max(1) as f64;
    let arrival_start = kickoff - venue.arrival_window_minutes as f64;
    let egress_start = egress
        .early_exit_minute
        .unwrap_or(venue.final_whistle_minute) as f64;
    let decay = egress.postgame_decay_minutes.max(1) as f64;
    let egress_end = egress_start + decay;

    let scaled = |raw: f64| 1.0 + (raw - 1.0) * proximity;

    if m < arrival_start {
        return 1.0;
    }

    if m < kickoff {
        let t = (m - arrival_start) / arrival_window;
        return scaled(1.0 + (egress.pregame_peak - 1.0) * smooth(t));
    }

    if m < egress_start {
        let level = if m < kickoff + settle {
            let t = (m - kickoff) / settle;
            egress.pregame_peak + (egress.during_game_level - egress.pregame_peak) * smooth(t)
        } else {
            egress.during_game_level
        };
        return scaled(level);
    }

    if m <= egress_end {
        let t = (m - egress_start) / decay;
        let peak_frac = venue.egress_peak_fraction.clamp(f64::EPSILON, 1.0 - f64::EPSILON);
        let raw = if t <= peak_frac {
            let rise = smooth(t / peak_frac);
            egress.during_game_level + (egress.postgame_peak - egress.during_game_level) * rise
        } else {
            let fall = smooth((t - peak_frac) / (1.0 - peak_frac));
            egress.postgame_peak + (1.0 - egress.postgame_peak) * fall
        };
        return scaled(raw);
    }

    1.0
}

/// Expected non-event load for a corridor at `minute`.
pub fn baseline_load(corridor: &Corridor, profile: &DailyProfile, minute: Minute) -> f64 {
    corridor.baseline_daily_volume * profile.weight(minute)
}

/// Round to an integer count, never below 1.
fn load_count(x: f64) -> u32 {
    if !x.is_finite() {
        return 1;
    }
    x.round().clamp(1.0, u32::MAX as f64) as u32
}

/// Build all corridor rows for one scenario, corridor-major, minutes ascending.
pub fn synthesize_corridor_loads(
    scenario: &Scenario,
    corridors: &CorridorTable,
    profile: &DailyProfile,
    venue: &VenueConfig,
) -> Vec<CorridorLoadRecord> {
    let egress = scenario.egress_profile();
    let mut rows = Vec::with_capacity(corridors.len() * crate::types::MINUTES_PER_DAY);

    for corridor in corridors.iter() {
        for minute in all_minutes() {
            let load = baseline_load(corridor, profile, minute)
                * event_multiplier(minute, venue, &egress, corridor.proximity);
            rows.push(CorridorLoadRecord {
                scenario_id: scenario.id.clone(),
                minute,
                corridor_id: corridor.id.clone(),
                transit_load: load_count(load),
                pedestrian_volume: load_count(load * corridor.pedestrian_ratio),
            });
        }
    }

    rows
}
