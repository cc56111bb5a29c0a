// src/pipeline.rs
//
// Batch precompute pipeline.
//
// Per scenario: corridor rows first (independent of game state), then one
// prediction per minute in increasing order, then a routing decision for
// each minute whose threat is at or above the routing threshold. A full run
// writes every scenario into one freshly staged cache generation and
// publishes it at the end; a scenario that fails is reported and contributes
// no rows, without affecting the others.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStore, GenerationId, ScenarioRows};
use crate::catalog::RouteCatalog;
use crate::config::Config;
use crate::corridor::CorridorTable;
use crate::error::PipelineError;
use crate::features::{CorridorContext, CorridorSample};
use crate::games::{GameStateSource, PlayByPlaySource};
use crate::logging::{MinuteTelemetry, PipelineSink};
use crate::predictor::{ModelHandle, Predictor};
use crate::profile::DailyProfile;
use crate::routing::{RoutingContext, RoutingEngine};
use crate::scenario::ScenarioRegistry;
use crate::synth::{baseline_load, synthesize_corridor_loads};
use crate::types::{all_minutes, CorridorLoadRecord, PredictionRecord, MINUTES_PER_DAY};

/// Row counts and checksum for one successfully processed scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub scenario_id: String,
    pub corridor_rows: usize,
    pub prediction_rows: usize,
    pub routing_rows: usize,
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioFailure {
    pub scenario_id: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub generation: GenerationId,
    pub routing_strategy: String,
    pub model_degraded: bool,
    pub scenarios: Vec<ScenarioReport>,
    pub failures: Vec<ScenarioFailure>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Inputs and strategies for a pipeline run.
pub struct Pipeline {
    config: Config,
    scenarios: ScenarioRegistry,
    corridors: CorridorTable,
    profile: DailyProfile,
    catalog: RouteCatalog,
    games: Box<dyn GameStateSource>,
    predictor: Predictor,
    router: RoutingEngine,
}

impl Pipeline {
    /// Built-in venue data with model and routing strategy taken from `config`.
    pub fn from_config(config: Config) -> Self {
        let predictor = Predictor::new(ModelHandle::from_config(&config.model), config.venue.capacity);
        let router = RoutingEngine::from_config(&config);
        let games = PlayByPlaySource::builtin(config.venue.kickoff_minute);
        Self {
            scenarios: ScenarioRegistry::builtin(),
            corridors: CorridorTable::builtin(),
            profile: DailyProfile::builtin_weekday(),
            catalog: RouteCatalog::builtin(),
            games: Box::new(games),
            predictor,
            router,
            config,
        }
    }

    /// Built-in venue data, heuristic predictor and fallback routing only.
    pub fn offline(config: Config) -> Self {
        let predictor = Predictor::new(ModelHandle::heuristic(), config.venue.capacity);
        let router = RoutingEngine::fallback_only(config.routing.threshold);
        let games = PlayByPlaySource::builtin(config.venue.kickoff_minute);
        Self {
            scenarios: ScenarioRegistry::builtin(),
            corridors: CorridorTable::builtin(),
            profile: DailyProfile::builtin_weekday(),
            catalog: RouteCatalog::builtin(),
            games: Box::new(games),
            predictor,
            router,
            config,
        }
    }

    pub fn with_scenarios(mut self, scenarios: ScenarioRegistry) -> Self {
        self.scenarios = scenarios;
        self
    }

    pub fn with_corridors(mut self, corridors: CorridorTable) -> Self {
        self.corridors = corridors;
        self
    }

    pub fn with_profile(mut self, profile: DailyProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_catalog(mut self, catalog: RouteCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_games(mut self, games: Box<dyn GameStateSource>) -> Self {
        self.games = games;
        self
    }

    pub fn with_predictor(mut self, predictor: Predictor) -> Self {
        self.predictor = predictor;
        self
    }

    pub fn with_router(mut self, router: RoutingEngine) -> Self {
        self.router = router;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scenarios(&self) -> &ScenarioRegistry {
        &self.scenarios
    }

    pub fn catalog(&self) -> &RouteCatalog {
        &self.catalog
    }

    /// Compute all rows for one scenario without touching any store.
    pub fn run_scenario(&self, scenario_id: &str, sink: &mut dyn PipelineSink) -> Result<ScenarioRows, PipelineError> {
        let scenario = self.scenarios.get(scenario_id)?;
        if !self.games.has_scenario(scenario_id) {
            return Err(PipelineError::PreconditionFailed(format!(
                "no game timeline for scenario '{scenario_id}'"
            )));
        }

        let corridor_loads =
            synthesize_corridor_loads(scenario, &self.corridors, &self.profile, &self.config.venue);
        let per_minute = self.corridor_contexts(&corridor_loads);

        let mut predictions = Vec::with_capacity(MINUTES_PER_DAY);
        let mut routing_decisions = Vec::new();

        for (minute, ctx) in all_minutes().zip(&per_minute) {
            let game_state = self.games.state_at(scenario_id, minute);
            let prediction = self.predictor.predict(&game_state, Some(ctx));

            let transit_loads: BTreeMap<String, u32> = ctx
                .current
                .iter()
                .map(|(id, s)| (id.clone(), s.transit_load as u32))
                .collect();
            let pedestrian_volume: BTreeMap<String, u32> = ctx
                .current
                .iter()
                .map(|(id, s)| (id.clone(), s.pedestrian_volume as u32))
                .collect();
            let total_transit_load = transit_loads.values().map(|&v| v as u64).sum();
            let total_pedestrian_volume = pedestrian_volume.values().map(|&v| v as u64).sum();

            let decision = self.router.decide(&RoutingContext {
                threat_score: prediction.threat_score,
                crowd_volume: prediction.crowd_volume,
                game_state: &game_state,
                transit_loads,
                pedestrian_volume,
                catalog: &self.catalog,
            });

            sink.log_minute(&MinuteTelemetry {
                scenario_id,
                minute,
                threat_score: prediction.threat_score,
                crowd_volume: prediction.crowd_volume,
                total_transit_load,
                total_pedestrian_volume,
                routed: decision.is_some(),
                severity: decision.as_ref().map(|d| d.severity.level()),
                strategy: self.router.strategy_name(),
            });

            if let Some(decision) = decision {
                routing_decisions.push(decision.into_record(scenario_id, minute));
            }
            predictions.push(PredictionRecord {
                scenario_id: scenario_id.to_string(),
                minute,
                threat_score: prediction.threat_score,
                crowd_volume: prediction.crowd_volume,
                game_state,
            });
        }

        let mut rows = ScenarioRows {
            corridor_loads,
            predictions,
            routing_decisions,
        };
        rows.canonicalize();

        info!(
            scenario_id,
            corridor_rows = rows.corridor_loads.len(),
            prediction_rows = rows.predictions.len(),
            routing_rows = rows.routing_decisions.len(),
            "scenario computed"
        );
        Ok(rows)
    }

    /// Current corridor samples (as stored) plus the non-event baseline.
    fn corridor_contexts(&self, rows: &[CorridorLoadRecord]) -> Vec<CorridorContext> {
        let mut out: Vec<CorridorContext> = vec![CorridorContext::default(); MINUTES_PER_DAY];
        for row in rows {
            if let Some(ctx) = out.get_mut(row.minute as usize) {
                ctx.current.insert(
                    row.corridor_id.clone(),
                    CorridorSample {
                        transit_load: row.transit_load as f64,
                        pedestrian_volume: row.pedestrian_volume as f64,
                    },
                );
            }
        }
        for corridor in self.corridors.iter() {
            for (minute, ctx) in all_minutes().zip(out.iter_mut()) {
                let base = baseline_load(corridor, &self.profile, minute);
                ctx.baseline.insert(
                    corridor.id.clone(),
                    CorridorSample {
                        transit_load: base,
                        pedestrian_volume: base * corridor.pedestrian_ratio,
                    },
                );
            }
        }
        out
    }

    /// Rebuild every scenario into a new generation and publish it.
    ///
    /// Cache faults abort the run and discard the staged generation; the
    /// previously active generation keeps serving.
    pub fn run_all(&self, store: &dyn CacheStore, sink: &mut dyn PipelineSink) -> Result<RunReport, PipelineError> {
        let generation = store.stage()?;
        debug!(generation, "staged cache generation");

        let mut scenarios = Vec::new();
        let mut failures = Vec::new();

        for scenario in self.scenarios.iter() {
            let rows = match self.run_scenario(&scenario.id, sink) {
                Ok(rows) => rows,
                Err(e) => {
                    error!(scenario_id = %scenario.id, error = %e, "scenario failed; no rows written");
                    failures.push(ScenarioFailure {
                        scenario_id: scenario.id.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let written = rows
                .checksum()
                .and_then(|checksum| store.write_scenario(generation, &scenario.id, &rows).map(|_| checksum));
            let checksum = match written {
                Ok(c) => c,
                Err(e) => {
                    if let Err(discard_err) = store.discard(generation) {
                        warn!(generation, error = %discard_err, "could not discard failed generation");
                    }
                    return Err(e.into());
                }
            };

            scenarios.push(ScenarioReport {
                scenario_id: scenario.id.clone(),
                corridor_rows: rows.corridor_loads.len(),
                prediction_rows: rows.predictions.len(),
                routing_rows: rows.routing_decisions.len(),
                checksum,
            });
        }

        store.publish(generation)?;
        info!(
            generation,
            scenarios = scenarios.len(),
            failures = failures.len(),
            "published cache generation"
        );

        Ok(RunReport {
            generation,
            routing_strategy: self.router.strategy_name().to_string(),
            model_degraded: self.predictor.handle().is_degraded(),
            scenarios,
            failures,
        })
    }
}
