// src/config.rs
//
// Central configuration for the CrowdShield pipeline.
// This is the single source of truth for venue timing, routing thresholds,
// Monte Carlo surge parameters, advisory endpoint settings and the trained
// model location. Scenario- and corridor-specific tuning lives in
// `scenario` and `corridor`.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};

use crate::types::Minute;

#[derive(Debug, Clone)]
pub struct Config {
    /// Human-readable config / release version.
    pub version: &'static str,
    pub venue: VenueConfig,
    pub routing: RoutingConfig,
    pub surge: SurgeConfig,
    pub advisory: AdvisoryConfig,
    pub model: ModelConfig,
}

/// Venue capacity and event timing, in minutes from midnight.
#[derive(Debug, Clone)]
pub struct VenueConfig {
    pub name: String,
    /// Calibration capacity used to bound crowd estimates.
    pub capacity: u32,
    /// Kickoff (18:30).
    pub kickoff_minute: Minute,
    /// Nominal final whistle (21:00).
    pub final_whistle_minute: Minute,
    /// Fans arrive over this many minutes before kickoff.
    pub arrival_window_minutes: u32,
    /// Minutes for corridor traffic to settle once the game starts.
    pub settle_minutes: u32,
    /// Fraction of the egress decay window spent ramping to the peak.
    pub egress_peak_fraction: f64,
}

#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// Threat at or above this value is "elevated": routing is triggered and
    /// the fallback strategy emits its elevated decision.
    pub threshold: f64,
    /// Additional advisory attempts after the first validation failure.
    pub max_advisory_retries: u32,
}

/// Monte Carlo surge simulation parameters.
#[derive(Debug, Clone)]
pub struct SurgeConfig {
    /// Samples per minute.
    pub num_simulations: usize,
    pub seed: u64,
    /// Capacity used to normalise crowd volume in the baseline rate.
    pub capacity: u32,
    /// Minute-of-day at the centre of the catalyst wave.
    pub catalyst_minute: f64,
    /// Gaussian width of the catalyst wave, in minutes.
    pub catalyst_width: f64,
    /// Platform throughput (fans/minute) treated as 100 % utilisation.
    pub critical_capacity_threshold: u32,
}

/// External advisory service (OpenAI-compatible chat completions).
#[derive(Debug, Clone)]
pub struct AdvisoryConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl AdvisoryConfig {
    /// The advisory strategy is only selected when credentials are present.
    pub fn is_configured(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelConfig {
    /// Trained model bundle (JSON). Absent means heuristic-only.
    pub path: Option<PathBuf>,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            name: "Lumen Field, Seattle".to_string(),
            capacity: 68_000,
            kickoff_minute: 18 * 60 + 30,
            final_whistle_minute: 21 * 60,
            arrival_window_minutes: 120,
            settle_minutes: 20,
            egress_peak_fraction: 0.20,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            max_advisory_retries: 2,
        }
    }
}

impl Default for SurgeConfig {
    fn default() -> Self {
        Self {
            num_simulations: 10_000,
            seed: 42,
            capacity: 68_000,
            catalyst_minute: 1125.0,
            catalyst_width: 18.0,
            critical_capacity_threshold: 133,
        }
    }
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            timeout: Duration::from_secs(20),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "crowdshield-v0.1",
            venue: VenueConfig::default(),
            routing: RoutingConfig::default(),
            surge: SurgeConfig::default(),
            advisory: AdvisoryConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl Config {
    /// Build a Config from defaults, then apply environment overrides.
    ///
    ///   - CROWDSHIELD_MODEL_PATH             (path to model bundle JSON)
    ///   - CROWDSHIELD_ADVISORY_API_KEY       (falls back to OPENAI_API_KEY)
    ///   - CROWDSHIELD_ADVISORY_URL           (base URL)
    ///   - CROWDSHIELD_ADVISORY_MODEL         (model name)
    ///   - CROWDSHIELD_ADVISORY_TIMEOUT_SECS  (u64)
    ///   - CROWDSHIELD_SURGE_SAMPLES          (usize, >= 1)
    ///   - CROWDSHIELD_SURGE_SEED             (u64)
    ///   - CROWDSHIELD_ROUTING_THRESHOLD      (f64, clamped to [0, 1])
    ///
    /// Any variable that fails to parse is ignored with a warning, as is a
    /// non-finite routing threshold.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Config::default();
        let non_empty = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(path) = non_empty("CROWDSHIELD_MODEL_PATH") {
            info!(path = %path, "CROWDSHIELD_MODEL_PATH overrode default");
            cfg.model.path = Some(PathBuf::from(path));
        }

        cfg.advisory.api_key =
            non_empty("CROWDSHIELD_ADVISORY_API_KEY").or_else(|| non_empty("OPENAI_API_KEY"));

        if let Some(url) = non_empty("CROWDSHIELD_ADVISORY_URL") {
            cfg.advisory.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = non_empty("CROWDSHIELD_ADVISORY_MODEL") {
            cfg.advisory.model = model;
        }

        let mut timeout_secs = cfg.advisory.timeout.as_secs();
        override_from(&lookup, "CROWDSHIELD_ADVISORY_TIMEOUT_SECS", &mut timeout_secs);
        cfg.advisory.timeout = Duration::from_secs(timeout_secs.max(1));

        override_from(&lookup, "CROWDSHIELD_SURGE_SAMPLES", &mut cfg.surge.num_simulations);
        cfg.surge.num_simulations = cfg.surge.num_simulations.max(1);

        override_from(&lookup, "CROWDSHIELD_SURGE_SEED", &mut cfg.surge.seed);

        let mut threshold = cfg.routing.threshold;
        override_from(&lookup, "CROWDSHIELD_ROUTING_THRESHOLD", &mut threshold);
        if threshold.is_finite() {
            cfg.routing.threshold = threshold.clamp(0.0, 1.0);
        } else {
            warn!(
                "CROWDSHIELD_ROUTING_THRESHOLD = {threshold} is not finite; using default {}",
                cfg.routing.threshold
            );
        }

        cfg
    }
}

fn override_from<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, slot: &mut T)
where
    T: FromStr + Display,
{
    let Some(raw) = lookup(name) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => {
            info!("{name} = {v} (overrode default)");
            *slot = v;
        }
        Err(_) => {
            warn!("could not parse {name} = {raw:?}; using default {slot}");
        }
    }
}
