// src/main.rs
//
// Thin harness around the CrowdShield library.
// All of the real logic lives in the lib crate (pipeline, cache, timeline).

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::warn;

use crowdshield::games::PlayByPlaySource;
use crowdshield::logging::init_tracing;
use crowdshield::profile::{DailyProfile, DEFAULT_BIN_MINUTES};
use crowdshield::{
    load_timeline, Config, JsonlSink, NoopSink, Pipeline, PipelineSink, RouteCatalog,
    ScenarioRegistry, SqliteCacheStore,
};

const DEFAULT_DB: &str = "crowdshield.db";

/// Command-line arguments for the CrowdShield binary.
#[derive(Parser, Debug)]
#[command(name = "crowdshield", version, about)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline into a SQLite cache and print the run report.
    Precompute {
        /// SQLite cache file.
        #[arg(long, default_value = DEFAULT_DB)]
        db: PathBuf,

        /// Scenario set (YAML). Defaults to the built-in scenarios.
        #[arg(long)]
        scenarios: Option<PathBuf>,

        /// Route catalog (JSON). Defaults to the built-in catalog.
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Play-by-play records keyed by scenario id (JSON).
        #[arg(long)]
        plays: Option<PathBuf>,

        /// Historical traffic counts (JSON). Defaults to the built-in weekday shape.
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Optional JSONL path for per-minute telemetry.
        #[arg(long)]
        log_jsonl: Option<PathBuf>,
    },

    /// List scenarios.
    Scenarios {
        #[arg(long)]
        scenarios: Option<PathBuf>,
    },

    /// Print the assembled per-minute timeline for one scenario as JSON.
    Timeline {
        #[arg(long)]
        scenario: String,

        #[arg(long, default_value = DEFAULT_DB)]
        db: PathBuf,

        #[arg(long)]
        scenarios: Option<PathBuf>,

        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

/// Build the telemetry sink as a trait object so we can choose between
/// JsonlSink and NoopSink at runtime.
fn build_sink(log_jsonl: Option<&Path>) -> Box<dyn PipelineSink> {
    match log_jsonl {
        Some(path) => match JsonlSink::create(path) {
            Ok(s) => Box::new(s),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to create telemetry file; falling back to NoopSink");
                Box::new(NoopSink)
            }
        },
        None => Box::new(NoopSink),
    }
}

fn load_scenarios(path: Option<&Path>) -> Result<ScenarioRegistry> {
    match path {
        Some(p) => ScenarioRegistry::from_yaml_file(p).with_context(|| format!("loading scenarios from {}", p.display())),
        None => Ok(ScenarioRegistry::builtin()),
    }
}

fn load_catalog(path: Option<&Path>) -> Result<RouteCatalog> {
    match path {
        Some(p) => RouteCatalog::from_json_file(p).with_context(|| format!("loading route catalog from {}", p.display())),
        None => Ok(RouteCatalog::builtin()),
    }
}

fn precompute(
    cfg: Config,
    db: &Path,
    scenarios: Option<&Path>,
    catalog: Option<&Path>,
    plays: Option<&Path>,
    profile: Option<&Path>,
    log_jsonl: Option<&Path>,
) -> Result<()> {
    let kickoff = cfg.venue.kickoff_minute;
    let mut pipeline = Pipeline::from_config(cfg)
        .with_scenarios(load_scenarios(scenarios)?)
        .with_catalog(load_catalog(catalog)?);

    if let Some(p) = plays {
        let games = PlayByPlaySource::from_json_file(p, kickoff)
            .with_context(|| format!("loading play-by-play from {}", p.display()))?;
        pipeline = pipeline.with_games(Box::new(games));
    }
    if let Some(p) = profile {
        let profile = DailyProfile::from_json_file(p, DEFAULT_BIN_MINUTES)
            .with_context(|| format!("loading traffic profile from {}", p.display()))?;
        pipeline = pipeline.with_profile(profile);
    }

    let store = SqliteCacheStore::open(db).with_context(|| format!("opening cache {}", db.display()))?;
    let mut sink = build_sink(log_jsonl);
    let report = pipeline.run_all(&store, sink.as_mut())?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_complete() {
        bail!("{} scenario(s) failed", report.failures.len());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = Config::from_env();

    match cli.command {
        Command::Precompute {
            db,
            scenarios,
            catalog,
            plays,
            profile,
            log_jsonl,
        } => precompute(
            cfg,
            &db,
            scenarios.as_deref(),
            catalog.as_deref(),
            plays.as_deref(),
            profile.as_deref(),
            log_jsonl.as_deref(),
        ),
        Command::Scenarios { scenarios } => {
            let registry = load_scenarios(scenarios.as_deref())?;
            for s in registry.iter() {
                println!("{}\t{}\t{}\t{}", s.id, s.profile.as_str(), s.attendance, s.label);
            }
            Ok(())
        }
        Command::Timeline {
            scenario,
            db,
            scenarios,
            catalog,
        } => {
            let registry = load_scenarios(scenarios.as_deref())?;
            let catalog = load_catalog(catalog.as_deref())?;
            let store = SqliteCacheStore::open(&db).with_context(|| format!("opening cache {}", db.display()))?;
            let timeline = load_timeline(&registry, &store, &catalog, &scenario)?;
            println!("{}", serde_json::to_string(&timeline)?);
            Ok(())
        }
    }
}
