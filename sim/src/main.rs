//! RANGENAV SIM: drives the range-aided particle filter against a simulated robot.
//!
//! The robot follows a square path inside a 10 x 10 arena with a landmark in each corner, reporting
//! noisy odometry and noisy ranges to every landmark. The filter estimates the robot's pose on every
//! tick and the run is written to CSV alongside its error statistics.
//!
//! You can run simulations either by:
//!   1. Loading all parameters from a configuration file (TOML/JSON/YAML)
//!   2. Specifying parameters via command-line flags

mod common;

use clap::{Args, Parser, Subcommand};
use common::{ensure_parent_dir, init_logger, parse_level};
use log::{error, info};
use rangenav::sim::{NavigationResult, SimulationConfig, run_simulation};
use rangenav::{NoiseConfig, ParticleAveragingStrategy, ParticleResamplingStrategy};
use rayon::prelude::*;
use std::error::Error;
use std::path::{Path, PathBuf};

const LONG_ABOUT: &str = "RANGENAV SIM: drives the range-aided particle filter against a simulated robot.

A simulated robot follows a square path (four sides of eight unit steps, right turns) in a 10 x 10
arena with landmarks at each corner. Each tick it reports its commanded motion and noisy ranges to
every landmark; the particle filter estimates the pose and the run is written to CSV.

You can run simulations either by:
  1. Loading all parameters from a configuration file (TOML/JSON/YAML)
  2. Specifying parameters via command-line flags

Multiple trials use seeds seed, seed+1, ... and write one CSV per trial.";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "Range-aided particle filter simulator.", long_about = LONG_ABOUT)]
struct Cli {
    /// Run simulation from a configuration file (TOML/JSON/YAML)
    /// This option overrides any subcommand arguments
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Command to execute (ignored if --config is provided)
    #[command(subcommand)]
    command: Option<Command>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Run trials in parallel
    #[arg(long, global = true)]
    parallel: bool,
}

/// Top-level commands
#[derive(Subcommand, Clone)]
enum Command {
    #[command(name = "run", about = "Run the square path simulation")]
    Run(RunArgs),
    #[command(
        name = "create-config",
        about = "Write the default simulation configuration to a file"
    )]
    CreateConfig(CreateConfigArgs),
}

#[derive(Args, Clone, Debug)]
struct RunArgs {
    /// Output CSV file; multiple trials add a _trialK suffix
    #[arg(short, long, value_parser, default_value = "rangenav_results.csv")]
    output: PathBuf,

    /// Number of particles
    #[arg(long, default_value_t = 500)]
    particles: usize,

    /// Translation noise standard deviation
    #[arg(long, default_value_t = 0.1)]
    sigma_pos: f64,

    /// Rotation noise standard deviation (radians)
    #[arg(long, default_value_t = 0.05)]
    sigma_rot: f64,

    /// Range measurement noise standard deviation
    #[arg(long, default_value_t = 0.3)]
    sigma_sense: f64,

    /// Random seed for the robot and the filter
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Resampling strategy
    #[arg(long, value_enum, default_value_t = ParticleResamplingStrategy::Multinomial)]
    resampling: ParticleResamplingStrategy,

    /// Pose averaging strategy
    #[arg(long, value_enum, default_value_t = ParticleAveragingStrategy::UnweightedAverage)]
    averaging: ParticleAveragingStrategy,

    /// Number of independent trials
    #[arg(long, default_value_t = 1)]
    trials: usize,
}
impl RunArgs {
    fn to_config(&self, parallel: bool) -> SimulationConfig {
        SimulationConfig {
            output: self.output.to_string_lossy().into_owned(),
            num_particles: self.particles,
            seed: self.seed,
            trials: self.trials,
            parallel,
            resampling_strategy: self.resampling,
            averaging_strategy: self.averaging,
            noise: NoiseConfig::new(self.sigma_pos, self.sigma_rot, self.sigma_sense),
            ..Default::default()
        }
    }
}

#[derive(Args, Clone, Debug)]
struct CreateConfigArgs {
    /// Output configuration file (.toml, .json, .yaml or .yml)
    #[arg(short, long, value_parser)]
    output: PathBuf,
}

/// Error statistics of one finished trial
#[derive(Clone, Debug, PartialEq)]
struct TrialSummary {
    trial: usize,
    seed: u64,
    output: String,
    position_rmse: f64,
    heading_rmse: f64,
    final_error: f64,
}

fn run_trial(trial: usize, config: &SimulationConfig) -> Result<TrialSummary, Box<dyn Error>> {
    let result: NavigationResult = run_simulation(config)?;
    ensure_parent_dir(Path::new(&config.output))?;
    result.to_csv(&config.output)?;
    let summary = TrialSummary {
        trial,
        seed: config.seed,
        output: config.output.clone(),
        position_rmse: result.position_rmse().unwrap_or(f64::NAN),
        heading_rmse: result.heading_rmse().unwrap_or(f64::NAN),
        final_error: result.final_position_error().unwrap_or(f64::NAN),
    };
    info!(
        "Trial {} (seed {}): position RMSE {:.4}, heading RMSE {:.4} rad, final error {:.4} -> {}",
        summary.trial,
        summary.seed,
        summary.position_rmse,
        summary.heading_rmse,
        summary.final_error,
        summary.output
    );
    Ok(summary)
}

/// Run every configured trial and return their summaries in trial order.
fn run_trials(config: &SimulationConfig) -> Result<Vec<TrialSummary>, Box<dyn Error>> {
    if config.trials == 0 {
        return Err("trial count must be at least 1".into());
    }
    if config.trials == 1 {
        return Ok(vec![run_trial(0, config)?]);
    }
    let trials: Vec<(usize, SimulationConfig)> =
        (0..config.trials).map(|k| (k, config.for_trial(k))).collect();
    let execute = |(k, trial): &(usize, SimulationConfig)| {
        run_trial(*k, trial).map_err(|e| {
            error!("Trial {k} failed: {e}");
            e.to_string()
        })
    };
    let results: Vec<Result<TrialSummary, String>> = if config.parallel {
        info!("Running {} trials in parallel", config.trials);
        trials.par_iter().map(execute).collect()
    } else {
        trials.iter().map(execute).collect()
    };
    let summaries = results.into_iter().collect::<Result<Vec<_>, String>>()?;

    let mean_rmse =
        summaries.iter().map(|s| s.position_rmse).sum::<f64>() / summaries.len() as f64;
    info!(
        "Completed {} trials, mean position RMSE {:.4}",
        summaries.len(),
        mean_rmse
    );
    Ok(summaries)
}

/// Run a configuration loaded from `source`. The command-line `--parallel` flag can only switch
/// parallel trials on.
fn run_from_config(
    mut config: SimulationConfig,
    source: &Path,
    parallel: bool,
) -> Result<Vec<TrialSummary>, Box<dyn Error>> {
    config.parallel |= parallel;
    info!("Running simulation from config: {}", source.display());
    run_trials(&config)
}

fn create_config_file(args: &CreateConfigArgs) -> Result<(), Box<dyn Error>> {
    ensure_parent_dir(&args.output)?;
    SimulationConfig::default().to_file(&args.output)?;
    info!("Wrote default configuration to {}", args.output.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Some(ref config_path) = cli.config {
        let config = SimulationConfig::from_file(config_path)?;
        let log_file = cli
            .log_file
            .clone()
            .or_else(|| config.logging.file.as_ref().map(PathBuf::from));
        init_logger(
            parse_level(config.logging.level.as_str()),
            log_file.as_deref(),
        )?;
        run_from_config(config, config_path, cli.parallel)?;
        return Ok(());
    }

    init_logger(parse_level(&cli.log_level), cli.log_file.as_deref())?;

    match cli.command {
        Some(Command::Run(args)) => {
            run_trials(&args.to_config(cli.parallel))?;
            Ok(())
        }
        Some(Command::CreateConfig(args)) => create_config_file(&args),
        None => {
            eprintln!("Error: No command provided. Use -h or --help for usage information.");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_run_args_defaults() {
        let cli = Cli::try_parse_from(["rangenav-sim", "run"]).unwrap();
        let Some(Command::Run(args)) = cli.command else {
            panic!("expected run command");
        };
        let config = args.to_config(cli.parallel);
        assert_eq!(config.num_particles, 500);
        assert_eq!(config.seed, 42);
        assert_eq!(config.noise, NoiseConfig::new(0.1, 0.05, 0.3));
        assert_eq!(config.output, "rangenav_results.csv");
        assert_eq!(config.trials, 1);
        assert!(!config.parallel);
    }

    #[test]
    fn test_run_args_overrides() {
        let cli = Cli::try_parse_from([
            "rangenav-sim",
            "run",
            "--particles",
            "64",
            "--sigma-sense",
            "0.5",
            "--resampling",
            "systematic",
            "--averaging",
            "weighted-average",
            "--trials",
            "3",
            "--parallel",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert!(cli.parallel);
        assert_eq!(cli.log_level, "debug");
        let Some(Command::Run(args)) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.particles, 64);
        assert_eq!(args.sigma_sense, 0.5);
        assert_eq!(args.resampling, ParticleResamplingStrategy::Systematic);
        assert_eq!(args.averaging, ParticleAveragingStrategy::WeightedAverage);
        assert_eq!(args.trials, 3);
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        assert!(Cli::try_parse_from(["rangenav-sim", "run", "--resampling", "bogus"]).is_err());
    }

    #[test]
    fn test_create_config_writes_loadable_file() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("configs").join("default.yaml");
        create_config_file(&CreateConfigArgs {
            output: output.clone(),
        })
        .unwrap();
        let loaded = SimulationConfig::from_file(&output).unwrap();
        assert_eq!(loaded, SimulationConfig::default());
    }

    #[test]
    fn test_multiple_trials_write_one_file_each() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("runs").join("square.csv");
        for parallel in [false, true] {
            let config = SimulationConfig {
                output: output.to_string_lossy().into_owned(),
                num_particles: 50,
                trials: 3,
                parallel,
                ..Default::default()
            };
            let summaries = run_trials(&config).unwrap();
            assert_eq!(summaries.len(), 3);
            for (k, summary) in summaries.iter().enumerate() {
                assert_eq!(summary.trial, k);
                assert_eq!(summary.seed, 42 + k as u64);
                assert!(summary.position_rmse.is_finite());
                let path = dir.path().join("runs").join(format!("square_trial{k}.csv"));
                let loaded = NavigationResult::from_csv(&path, "trial").unwrap();
                assert_eq!(loaded.len(), 36);
            }
        }
    }

    #[test]
    fn test_parallel_trials_match_sequential() {
        let dir = tempdir().unwrap();
        let mut config = SimulationConfig {
            output: dir.path().join("a.csv").to_string_lossy().into_owned(),
            num_particles: 40,
            trials: 2,
            ..Default::default()
        };
        let sequential = run_trials(&config).unwrap();
        config.parallel = true;
        let parallel = run_trials(&config).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_single_trial_uses_output_verbatim() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("single.csv");
        let config = SimulationConfig {
            output: output.to_string_lossy().into_owned(),
            num_particles: 30,
            ..Default::default()
        };
        run_trials(&config).unwrap();
        assert!(output.exists());
    }

    #[test]
    fn test_zero_trials_is_an_error() {
        let config = SimulationConfig {
            trials: 0,
            ..Default::default()
        };
        assert!(run_trials(&config).is_err());
    }

    #[test]
    fn test_run_from_config_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("sim.toml");
        let config = SimulationConfig {
            output: dir.path().join("from_config.csv").to_string_lossy().into_owned(),
            num_particles: 30,
            trials: 2,
            ..Default::default()
        };
        config.to_file(&config_path).unwrap();
        let loaded = SimulationConfig::from_file(&config_path).unwrap();
        let summaries = run_from_config(loaded, &config_path, true).unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(dir.path().join("from_config_trial0.csv").exists());
        assert!(dir.path().join("from_config_trial1.csv").exists());
    }
}
