// src/corridor.rs
//
// Stadium-area corridor table.
//
// Each corridor carries a static weekday volume (from the city's traffic flow
// counts study), a foot-traffic-to-vehicle ratio and a proximity factor in
// [0, 1] that scales how strongly event-day behaviour reaches it
// (1.0 = directly outside the gates).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corridor {
    pub id: String,
    /// Average weekday daily traffic.
    pub baseline_daily_volume: f64,
    pub pedestrian_ratio: f64,
    pub proximity: f64,
}

impl Corridor {
    pub fn new(id: &str, baseline_daily_volume: f64, pedestrian_ratio: f64, proximity: f64) -> Self {
        Self {
            id: id.to_string(),
            baseline_daily_volume,
            pedestrian_ratio,
            proximity,
        }
    }
}

/// Ordered corridor table. Iteration order is the row-emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct CorridorTable {
    corridors: Vec<Corridor>,
}

impl CorridorTable {
    pub fn builtin() -> Self {
        Self {
            corridors: vec![
                Corridor::new("stadium_1st_ave", 21_583.0, 2.5, 1.0),
                Corridor::new("king_street", 4_918.0, 3.0, 0.7),
                Corridor::new("royal_brougham", 8_678.0, 1.5, 0.9),
                Corridor::new("4th_ave_s", 19_337.0, 1.2, 0.5),
                Corridor::new("occidental_ave", 387.0, 8.0, 1.0),
                Corridor::new("s_atlantic_st", 13_910.0, 1.0, 0.6),
            ],
        }
    }

    pub fn new(corridors: Vec<Corridor>) -> Result<Self, PipelineError> {
        let table = Self { corridors };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.corridors.is_empty() {
            return Err(PipelineError::invalid("corridors", "at least one corridor required"));
        }
        let mut seen = HashSet::new();
        for c in &self.corridors {
            if c.id.trim().is_empty() {
                return Err(PipelineError::invalid("corridor.id", "id cannot be empty"));
            }
            if !seen.insert(c.id.as_str()) {
                return Err(PipelineError::invalid(
                    "corridor.id",
                    format!("duplicate corridor id '{}'", c.id),
                ));
            }
            if !c.baseline_daily_volume.is_finite() || c.baseline_daily_volume < 0.0 {
                return Err(PipelineError::invalid(
                    format!("{}.baseline_daily_volume", c.id),
                    "must be finite and >= 0",
                ));
            }
            if !c.pedestrian_ratio.is_finite() || c.pedestrian_ratio < 0.0 {
                return Err(PipelineError::invalid(
                    format!("{}.pedestrian_ratio", c.id),
                    "must be finite and >= 0",
                ));
            }
            if !(0.0..=1.0).contains(&c.proximity) {
                return Err(PipelineError::invalid(
                    format!("{}.proximity", c.id),
                    "must be in [0, 1]",
                ));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Corridor> {
        self.corridors.iter().find(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Corridor> {
        self.corridors.iter()
    }

    pub fn len(&self) -> usize {
        self.corridors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corridors.is_empty()
    }
}
