//! CrowdShield core library.
//!
//! This crate exposes the stadium egress forecasting pipeline: corridor load
//! synthesis, threat and crowd prediction, routing decisions, the Monte Carlo
//! surge simulator and the generation-based scenario cache. The binaries
//! (`src/main.rs`, `src/bin/surge_sim.rs`) are thin harnesses around these
//! components.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod corridor;
pub mod error;
pub mod export;
pub mod features;
pub mod games;
pub mod logging;
pub mod pipeline;
pub mod predictor;
pub mod profile;
pub mod routing;
pub mod scenario;
pub mod stats;
pub mod surge;
pub mod synth;
pub mod timeline;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use cache::{CacheStore, GenerationId, MemoryCacheStore, ScenarioRows, SqliteCacheStore};

pub use catalog::RouteCatalog;

pub use config::Config;

pub use error::{CacheError, PipelineError};

pub use export::{build_surge_export, SurgeExport};

pub use games::{GameStateSource, PlayByPlaySource};

pub use logging::{JsonlSink, NoopSink, PipelineSink};

pub use pipeline::{Pipeline, RunReport};

pub use predictor::{ModelHandle, Predictor};

pub use routing::{RoutingDecision, RoutingEngine, RoutingStrategy};

pub use scenario::{Scenario, ScenarioRegistry};

pub use surge::simulate_surge_velocity;

pub use timeline::{assemble_timeline, load_timeline, ScenarioTimeline, TimelineSource};

pub use types::{
    CorridorLoadRecord, GameSnapshot, GameState, Minute, PredictionRecord, Route,
    RoutingDecisionRecord, Severity,
};
