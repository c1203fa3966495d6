//! Deterministic session simulator.
//!
//! Drives initialize -> complete -> rotate cycles for a set of synthetic
//! learners and prints a JSON summary of where every learner ended up.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;

use tube_scheduler::logging::init_tracing;
use tube_scheduler::{
    ChannelError, ChannelRotator, ConfigError, InMemoryProgressStore, InMemoryStateStore,
    ProgressError, ProgressStore, RepetitionError, SchedulerConfig, SequentialTemplateProvider,
    SessionScore, TubeId,
};

const QUESTIONS_PER_SESSION: u32 = 20;

#[derive(Parser, Debug)]
#[command(name = "tube-sim", about = "Simulate tube scheduling sessions", version)]
struct Cli {
    /// Number of synthetic learners
    #[arg(long, default_value_t = 4)]
    learners: usize,

    /// Sessions per learner; each session ends with a rotation
    #[arg(long, default_value_t = 10)]
    sessions: usize,

    /// Stitches seeded into each tube
    #[arg(long, default_value_t = 20)]
    units_per_tube: usize,

    /// Stitch completions per session
    #[arg(long, default_value_t = 5)]
    completions_per_session: usize,

    /// Probability that a completion is perfect
    #[arg(long, default_value_t = 0.7)]
    perfect_rate: f64,

    /// RNG seed; learner i uses seed + i
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// JSON config file; defaults to environment variables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pretty-print the summary
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, thiserror::Error)]
enum SimError {
    #[error("failed to read config {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct LearnerSummary {
    learner_id: String,
    completions: u32,
    perfect: u32,
    moved: u32,
    retired_blocked: u32,
    rotations: u64,
    live_tube: Option<TubeId>,
    active_unit: Option<String>,
    retired_stitches: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimSummary {
    config: SchedulerConfig,
    seed: u64,
    learners: Vec<LearnerSummary>,
}

fn load_config(path: Option<&PathBuf>) -> Result<SchedulerConfig, SimError> {
    let Some(path) = path else {
        let config = SchedulerConfig::from_env();
        config.validate()?;
        return Ok(config);
    };
    let raw = std::fs::read_to_string(path).map_err(|source| SimError::ReadConfig {
        path: path.clone(),
        source,
    })?;
    Ok(SchedulerConfig::from_json_str(&raw)?)
}

fn simulate_learner(
    rotator: &ChannelRotator,
    progress: &InMemoryProgressStore,
    cli: &Cli,
    index: usize,
) -> Result<LearnerSummary, SimError> {
    let learner_id = format!("learner-{index:03}");
    let mut rng = ChaCha8Rng::seed_from_u64(cli.seed.wrapping_add(index as u64));
    let mut summary = LearnerSummary {
        learner_id: learner_id.clone(),
        ..Default::default()
    };

    rotator.initialize(&learner_id)?;

    for _ in 0..cli.sessions {
        for _ in 0..cli.completions_per_session {
            let Some((stitch, _tube)) = rotator.get_active_unit(&learner_id)? else {
                break;
            };
            let record = progress.get_or_default(&learner_id, &stitch)?;

            let score = if rng.gen_bool(cli.perfect_rate.clamp(0.0, 1.0)) {
                SessionScore::perfect(QUESTIONS_PER_SESSION)
            } else {
                SessionScore::new(rng.gen_range(0..QUESTIONS_PER_SESSION), QUESTIONS_PER_SESSION)
            };

            match rotator.complete_active_unit(&learner_id, &record, &score) {
                Ok(outcome) => {
                    summary.completions += 1;
                    if outcome.skip.perfect {
                        summary.perfect += 1;
                    }
                    if outcome.placement.moved {
                        summary.moved += 1;
                    }
                    progress.put(&learner_id, outcome.record)?;
                }
                Err(ChannelError::Repetition(RepetitionError::StitchAlreadyRetired { unit_id })) => {
                    // Retired stitches belong to the monthly review, not this tube.
                    tracing::warn!(
                        learner_id = %learner_id,
                        unit_id = %unit_id,
                        "retired stitch at front of live tube"
                    );
                    summary.retired_blocked += 1;
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }

        rotator.rotate(&learner_id)?;
    }

    let roles = rotator.get_role_state(&learner_id)?;
    summary.rotations = roles.rotation_count();
    summary.live_tube = Some(roles.live());
    summary.active_unit = rotator
        .get_active_unit(&learner_id)?
        .map(|(stitch, _)| stitch.to_string());
    summary.retired_stitches = progress.retired(&learner_id).len();

    Ok(summary)
}

fn run(cli: Cli) -> Result<(), SimError> {
    let config = load_config(cli.config.as_ref())?;
    let _log_guard = init_tracing(&config);

    tracing::info!(
        learners = cli.learners,
        sessions = cli.sessions,
        seed = cli.seed,
        "starting simulation"
    );

    let rotator = ChannelRotator::new(
        Arc::new(InMemoryStateStore::new()),
        Arc::new(SequentialTemplateProvider::new(cli.units_per_tube)),
        config,
    );
    let progress = InMemoryProgressStore::new();

    let learners = (0..cli.learners)
        .into_par_iter()
        .map(|index| simulate_learner(&rotator, &progress, &cli, index))
        .collect::<Result<Vec<_>, _>>()?;

    let summary = SimSummary {
        config: rotator.config().clone(),
        seed: cli.seed,
        learners,
    };

    let output = if cli.pretty {
        serde_json::to_string_pretty(&summary)?
    } else {
        serde_json::to_string(&summary)?
    };
    println!("{output}");

    tracing::info!("simulation complete");
    Ok(())
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("tube-sim: {err}");
            ExitCode::FAILURE
        }
    }
}
