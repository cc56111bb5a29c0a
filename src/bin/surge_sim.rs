// src/bin/surge_sim.rs
//
// Monte Carlo surge harness.
//
// Reads one scenario's cached timeline, runs the seeded p95 surge simulation
// over every minute and writes the export (frames + summary) as JSON.
//
// Run examples:
//   cargo run --bin surge_sim -- --scenario scenario_c_blowout_q3
//   cargo run --bin surge_sim -- --samples 2000 --seed 7 --cache crowdshield.db --output-dir exports
//
// Notes:
// - The cache must have been populated by `crowdshield precompute`; a
//   scenario with no cached rows is an error here, never a synthetic export.
// - (timeline, seed, samples) fully determines the surge curve; the summary
//   carries a checksum so repeated runs can be compared.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::info;

use crowdshield::logging::init_tracing;
use crowdshield::{build_surge_export, load_timeline, Config, RouteCatalog, ScenarioRegistry, SqliteCacheStore};

const DEFAULT_SCENARIO: &str = "scenario_c_blowout_q3";
const EXPORT_FILE: &str = "surge_export.json";

#[derive(Parser, Debug)]
#[command(name = "surge_sim", about = "CrowdShield Monte Carlo surge export")]
struct Args {
    /// Scenario id to export.
    #[arg(long, default_value = DEFAULT_SCENARIO)]
    scenario: String,

    /// Samples per minute (overrides CROWDSHIELD_SURGE_SAMPLES).
    #[arg(long)]
    samples: Option<usize>,

    /// RNG seed (overrides CROWDSHIELD_SURGE_SEED).
    #[arg(long)]
    seed: Option<u64>,

    /// Directory for surge_export.json (created if missing).
    #[arg(long, default_value = "exports")]
    output_dir: PathBuf,

    /// SQLite cache written by `crowdshield precompute`.
    #[arg(long, default_value = "crowdshield.db")]
    cache: PathBuf,

    /// Only print the output path.
    #[arg(long)]
    quiet: bool,

    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut cfg = Config::from_env();
    if let Some(n) = args.samples {
        cfg.surge.num_simulations = n.max(1);
    }
    if let Some(seed) = args.seed {
        cfg.surge.seed = seed;
    }

    let registry = ScenarioRegistry::builtin();
    let catalog = RouteCatalog::builtin();
    let store = SqliteCacheStore::open(&args.cache)
        .with_context(|| format!("opening cache {}", args.cache.display()))?;

    let timeline = load_timeline(&registry, &store, &catalog, &args.scenario)?;
    let export = build_surge_export(&timeline, &cfg.surge, &catalog)?;

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;
    let out_path = args.output_dir.join(EXPORT_FILE);
    fs::write(&out_path, serde_json::to_vec_pretty(&export)?)
        .with_context(|| format!("writing {}", out_path.display()))?;

    info!(
        scenario_id = %export.scenario_id,
        peak = export.summary.peak_surge_velocity,
        lockdown_minutes = export.summary.lockdown_minutes,
        path = %out_path.display(),
        "surge export written"
    );

    if args.quiet {
        println!("{}", out_path.display());
    } else {
        println!("{}", serde_json::to_string_pretty(&export.summary)?);
    }
    Ok(())
}
