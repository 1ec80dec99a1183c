//! Simulation utilities for range-aided localization.
//!
//! This module provides:
//! - A fixed rectangular arena (`Map`) with walls and known landmarks
//! - A simulated ground-truth `Robot` with noisy motion and noisy range sensing
//! - The square driving pattern (`SquarePath`) and the `run_simulation` driver
//! - `NavigationResult` for storing, scoring and exporting a run to CSV
//! - `SimulationConfig` with JSON/YAML/TOML file support
use crate::error::Result;
use crate::filter::{FilterConfig, ParticleFilter};
use crate::measurements::{Landmark, expected_range};
use crate::noise::{NoiseConfig, NoiseModel};
use crate::particle::{ParticleAveragingStrategy, ParticleResamplingStrategy};
use crate::{Control, Pose2D, angle_difference, wrap_to_2pi};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
use std::fmt::{self, Display};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

/// Straight wall segment of the arena boundary
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub start: Landmark,
    pub end: Landmark,
}
impl Wall {
    pub fn new(start: Landmark, end: Landmark) -> Self {
        Wall { start, end }
    }
}

/// Static environment: boundary walls plus the landmark list used for ranging.
///
/// The landmark order is the order in which ranges are reported.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Map {
    walls: Vec<Wall>,
    landmarks: Vec<Landmark>,
}
impl Default for Map {
    /// 10 x 10 arena with a landmark in each corner
    fn default() -> Self {
        let corners = [
            Landmark::new(0.0, 0.0),
            Landmark::new(10.0, 0.0),
            Landmark::new(10.0, 10.0),
            Landmark::new(0.0, 10.0),
        ];
        let walls = (0..4)
            .map(|i| Wall::new(corners[i], corners[(i + 1) % 4]))
            .collect();
        Map {
            walls,
            landmarks: vec![
                Landmark::new(0.0, 0.0),
                Landmark::new(0.0, 10.0),
                Landmark::new(10.0, 10.0),
                Landmark::new(10.0, 0.0),
            ],
        }
    }
}
impl Map {
    pub fn new(walls: Vec<Wall>, landmarks: Vec<Landmark>) -> Self {
        Map { walls, landmarks }
    }
    pub fn walls(&self) -> &[Wall] {
        &self.walls
    }
    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }
    /// Whether `(x, y)` lies inside the axis-aligned bounding box of the walls, edges included
    pub fn contains(&self, x: f64, y: f64) -> bool {
        if self.walls.is_empty() {
            return false;
        }
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for wall in &self.walls {
            for p in [wall.start, wall.end] {
                min_x = min_x.min(p.x);
                min_y = min_y.min(p.y);
                max_x = max_x.max(p.x);
                max_y = max_y.max(p.y);
            }
        }
        (min_x..=max_x).contains(&x) && (min_y..=max_y).contains(&y)
    }
}

/// Simulated ground-truth vehicle.
///
/// Motion and sensing are corrupted with the same noise model the filter assumes, drawn from the
/// robot's own random stream.
#[derive(Clone, Debug)]
pub struct Robot {
    pose: Pose2D,
    noise: NoiseModel,
}
impl Robot {
    pub fn new(pose: Pose2D, noise: NoiseModel) -> Self {
        Robot {
            pose: Pose2D::new(pose.x, pose.y, wrap_to_2pi(pose.theta)),
            noise,
        }
    }
    pub fn pose(&self) -> Pose2D {
        self.pose
    }
    /// Drive forward along the current heading by a noisy distance
    pub fn move_forward(&mut self, distance: f64) {
        let noisy = distance + self.noise.sample_translation();
        self.pose.x += noisy * self.pose.theta.cos();
        self.pose.y += noisy * self.pose.theta.sin();
    }
    /// Turn in place by a noisy angle
    pub fn rotate(&mut self, rotation: f64) {
        let noisy = rotation + self.noise.sample_rotation();
        self.pose.theta = wrap_to_2pi(self.pose.theta + noisy);
    }
    /// Noisy range to every landmark, in landmark order
    pub fn sense(&mut self, landmarks: &[Landmark]) -> Vec<f64> {
        landmarks
            .iter()
            .map(|l| expected_range(self.pose.x, self.pose.y, l) + self.noise.sample_measurement())
            .collect()
    }
}

/// Closed driving pattern: a run of unit forward steps per side followed by a turn in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SquarePath {
    /// Number of forward steps on each side
    pub side_lengths: Vec<usize>,
    pub forward_distance: f64,
    /// Turn applied after each side, radians (negative turns right)
    pub turn_angle: f64,
    pub start: Pose2D,
}
impl Default for SquarePath {
    fn default() -> Self {
        SquarePath {
            side_lengths: vec![8, 8, 8, 8],
            forward_distance: 1.0,
            turn_angle: -FRAC_PI_2,
            start: Pose2D::new(1.0, 1.0, 0.0),
        }
    }
}
impl SquarePath {
    /// Sequence of control inputs that drives the pattern once
    pub fn controls(&self) -> Vec<Control> {
        let mut controls = Vec::with_capacity(self.side_lengths.iter().sum::<usize>() + 4);
        for &side in &self.side_lengths {
            controls.extend(std::iter::repeat_n(
                Control::forward(self.forward_distance),
                side,
            ));
            controls.push(Control::turn(self.turn_angle));
        }
        controls
    }
}

/// One filter tick of a simulation run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NavigationRecord {
    pub step: usize,
    pub true_x: f64,
    pub true_y: f64,
    pub true_theta: f64,
    pub est_x: f64,
    pub est_y: f64,
    pub est_theta: f64,
    pub position_error: f64,
    /// Absolute wrapped heading error, radians
    pub heading_error: f64,
    /// Effective sample size after weighting, before any resampling
    pub effective_sample_size: f64,
    pub resampled: bool,
}
impl NavigationRecord {
    pub fn new(
        step: usize,
        truth: Pose2D,
        estimate: Pose2D,
        effective_sample_size: f64,
        resampled: bool,
    ) -> Self {
        NavigationRecord {
            step,
            true_x: truth.x,
            true_y: truth.y,
            true_theta: truth.theta,
            est_x: estimate.x,
            est_y: estimate.y,
            est_theta: estimate.theta,
            position_error: truth.distance_to(&estimate),
            heading_error: angle_difference(estimate.theta, truth.theta).abs(),
            effective_sample_size,
            resampled,
        }
    }
    pub fn truth(&self) -> Pose2D {
        Pose2D::new(self.true_x, self.true_y, self.true_theta)
    }
    pub fn estimate(&self) -> Pose2D {
        Pose2D::new(self.est_x, self.est_y, self.est_theta)
    }
}

/// Recorded trajectory of a simulation run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NavigationResult {
    pub records: Vec<NavigationRecord>,
    pub name: String,
}
impl NavigationResult {
    pub fn new(name: &str) -> Self {
        NavigationResult {
            records: Vec::new(),
            name: name.to_string(),
        }
    }
    /// Writes the records to a CSV file with a header row.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use rangenav::sim::{SimulationConfig, run_simulation};
    ///
    /// let result = run_simulation(&SimulationConfig::default()).unwrap();
    /// result.to_csv("square_path.csv").expect("Failed to write results");
    /// ```
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
    /// Reads records previously written by [`to_csv`](Self::to_csv).
    pub fn from_csv<P: AsRef<Path>>(
        path: P,
        name: &str,
    ) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut result = NavigationResult::new(name);
        for record in reader.deserialize() {
            result.records.push(record?);
        }
        Ok(result)
    }
    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
    /// Root mean square position error over all ticks, `None` for an empty run
    pub fn position_rmse(&self) -> Option<f64> {
        rms(self.records.iter().map(|r| r.position_error))
    }
    /// Root mean square heading error over all ticks, `None` for an empty run
    pub fn heading_rmse(&self) -> Option<f64> {
        rms(self.records.iter().map(|r| r.heading_error))
    }
    pub fn final_position_error(&self) -> Option<f64> {
        self.records.last().map(|r| r.position_error)
    }
    /// Number of ticks on which the population was resampled
    pub fn resample_count(&self) -> usize {
        self.records.iter().filter(|r| r.resampled).count()
    }
}

fn rms(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v * v, c + 1));
    if count == 0 {
        None
    } else {
        Some((sum / count as f64).sqrt())
    }
}

/// Log verbosity written to simulation configuration files
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}
impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}
impl Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    /// Append log lines to this file instead of stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

fn default_seed() -> u64 {
    42
}
fn default_trials() -> usize {
    1
}
fn default_threshold() -> f64 {
    0.5
}
fn default_output() -> String {
    "rangenav_results.csv".to_string()
}

/// Complete description of a simulation run, loadable from JSON, YAML or TOML.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// CSV output path; multi-trial runs add a `_trialK` suffix
    #[serde(default = "default_output")]
    pub output: String,
    pub num_particles: usize,
    /// Base seed. Trial k uses `seed + k`.
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_trials")]
    pub trials: usize,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default = "default_threshold")]
    pub effective_sample_threshold: f64,
    #[serde(default)]
    pub resampling_strategy: ParticleResamplingStrategy,
    #[serde(default)]
    pub averaging_strategy: ParticleAveragingStrategy,
    pub noise: NoiseConfig,
    #[serde(default)]
    pub path: SquarePath,
    #[serde(default)]
    pub logging: LoggingConfig,
}
impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            output: default_output(),
            num_particles: 500,
            seed: default_seed(),
            trials: default_trials(),
            parallel: false,
            effective_sample_threshold: default_threshold(),
            resampling_strategy: ParticleResamplingStrategy::default(),
            averaging_strategy: ParticleAveragingStrategy::default(),
            noise: NoiseConfig::new(0.1, 0.05, 0.3),
            path: SquarePath::default(),
            logging: LoggingConfig::default(),
        }
    }
}
impl SimulationConfig {
    /// Filter parameters for a run seeded with `seed`
    pub fn filter_config(&self, seed: u64) -> FilterConfig {
        FilterConfig {
            num_particles: self.num_particles,
            noise: self.noise,
            resampling_strategy: self.resampling_strategy,
            averaging_strategy: self.averaging_strategy,
            effective_sample_threshold: self.effective_sample_threshold,
            seed: Some(seed),
        }
    }
    /// Copy of this configuration for trial `k`: seed offset by `k` and a suffixed output path.
    pub fn for_trial(&self, k: usize) -> SimulationConfig {
        let mut trial = self.clone();
        trial.seed = self.seed.wrapping_add(k as u64);
        trial.trials = 1;
        let path = Path::new(&self.output);
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("rangenav_results");
        let file = match path.extension().and_then(|s| s.to_str()) {
            Some(ext) => format!("{stem}_trial{k}.{ext}"),
            None => format!("{stem}_trial{k}"),
        };
        trial.output = path.with_file_name(file).to_string_lossy().into_owned();
        trial
    }

    /// Write the configuration to a JSON file (pretty-printed).
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }
    pub fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(io::Error::other)
    }
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = serde_yaml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_yaml::from_reader(file).map_err(io::Error::other)
    }
    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = toml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    pub fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut s = String::new();
        File::open(path)?.read_to_string(&mut s)?;
        toml::from_str(&s).map_err(io::Error::other)
    }
    /// Write in the format named by the file extension (.json/.yaml/.yml/.toml)
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("yaml") | Some("yml") => self.to_yaml(p),
            Some("toml") => self.to_toml(p),
            _ => Err(unsupported(p)),
        }
    }
    /// Read in the format named by the file extension (.json/.yaml/.yml/.toml)
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("yaml") | Some("yml") => Self::from_yaml(p),
            Some("toml") => Self::from_toml(p),
            _ => Err(unsupported(p)),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

fn unsupported(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("unsupported config file extension: {}", path.display()),
    )
}

/// Drive the robot around the configured path once, filtering every tick.
///
/// Each forward step the robot moves, senses all landmarks, and the filter runs with control
/// `(d, 0)`; after each side the robot turns, senses, and the filter runs with control `(0, turn)`.
/// The robot and the filter draw from independent streams forked from `config.seed`.
pub fn run_simulation(config: &SimulationConfig) -> Result<NavigationResult> {
    let map = Map::default();
    let mut master = NoiseModel::new(config.noise, config.seed)?;
    let mut robot = Robot::new(config.path.start, master.fork());
    let filter_seed = master.fork().seed();
    let mut pf = ParticleFilter::new(config.filter_config(filter_seed), config.path.start)?;

    info!(
        "Running square path with {} particles (seed {}, {:?} resampling, {:?} averaging)",
        config.num_particles, config.seed, config.resampling_strategy, config.averaging_strategy
    );
    let mut result = NavigationResult::new(&format!("seed_{}", config.seed));
    let mut inside = true;
    for (step, control) in config.path.controls().into_iter().enumerate() {
        if control.distance != 0.0 {
            robot.move_forward(control.distance);
        }
        if control.rotation != 0.0 {
            robot.rotate(control.rotation);
        }
        let truth = robot.pose();
        if inside && !map.contains(truth.x, truth.y) {
            warn!("Robot left the arena at step {step}: {truth}");
            inside = false;
        }
        let measurements = robot.sense(map.landmarks());

        pf.predict(control);
        pf.weight(&measurements, map.landmarks())?;
        let n_eff = pf.effective_sample_size();
        let resampled = pf.resample_if_needed();
        let estimate = pf.estimate()?;

        let record = NavigationRecord::new(step, truth, estimate, n_eff, resampled);
        info!(
            "step {step}: truth {truth}, estimate {estimate}, error {:.4}",
            record.position_error
        );
        result.records.push(record);
    }
    if let Some(rmse) = result.position_rmse() {
        info!(
            "Finished {} ticks, position RMSE {:.4}, {} resamples",
            result.len(),
            rmse,
            pf.resample_count()
        );
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::{PI, TAU};
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_map() {
        let map = Map::default();
        assert_eq!(map.walls().len(), 4);
        assert_eq!(map.landmarks().len(), 4);
        assert_eq!(map.landmarks()[1], Landmark::new(0.0, 10.0));
        assert!(map.contains(5.0, 5.0));
        assert!(map.contains(0.0, 10.0));
        assert!(!map.contains(9.0, -1.0));
        assert!(!Map::new(Vec::new(), Vec::new()).contains(0.0, 0.0));
    }

    #[test]
    fn test_noiseless_robot() {
        let noise = NoiseModel::new(NoiseConfig::new(0.0, 0.0, 1e-9), 0).unwrap();
        let mut robot = Robot::new(Pose2D::new(1.0, 1.0, 0.0), noise);
        robot.move_forward(2.0);
        assert_approx_eq!(robot.pose().x, 3.0, 1e-12);
        robot.rotate(-PI / 2.0);
        assert_approx_eq!(robot.pose().theta, 1.5 * PI, 1e-12);
        robot.move_forward(1.0);
        assert_approx_eq!(robot.pose().y, 0.0, 1e-12);
        let ranges = robot.sense(&[Landmark::new(3.0, 4.0)]);
        assert_approx_eq!(ranges[0], 4.0, 1e-6);
    }

    #[test]
    fn test_robot_heading_stays_wrapped() {
        let noise = NoiseModel::new(NoiseConfig::new(0.1, 0.05, 0.3), 8).unwrap();
        let mut robot = Robot::new(Pose2D::new(0.0, 0.0, -1.0), noise);
        for _ in 0..20 {
            robot.rotate(-FRAC_PI_2);
            assert!((0.0..TAU).contains(&robot.pose().theta));
        }
    }

    #[test]
    fn test_square_path_controls() {
        let controls = SquarePath::default().controls();
        assert_eq!(controls.len(), 36);
        assert_eq!(controls[0], Control::forward(1.0));
        assert_eq!(controls[8], Control::turn(-FRAC_PI_2));
        assert_eq!(controls.iter().filter(|c| c.rotation != 0.0).count(), 4);
    }

    #[test]
    fn test_navigation_record_errors() {
        let truth = Pose2D::new(0.0, 0.0, 0.05);
        let estimate = Pose2D::new(3.0, 4.0, TAU - 0.05);
        let record = NavigationRecord::new(0, truth, estimate, 10.0, false);
        assert_approx_eq!(record.position_error, 5.0, 1e-12);
        assert_approx_eq!(record.heading_error, 0.1, 1e-12);
        assert_eq!(record.truth(), truth);
        assert_eq!(record.estimate(), estimate);
    }

    #[test]
    fn test_rmse() {
        let mut result = NavigationResult::new("rmse");
        assert_eq!(result.position_rmse(), None);
        for (i, err) in [3.0, 4.0].iter().enumerate() {
            let truth = Pose2D::default();
            let estimate = Pose2D::new(*err, 0.0, 0.0);
            result
                .records
                .push(NavigationRecord::new(i, truth, estimate, 1.0, i == 1));
        }
        assert_approx_eq!(result.position_rmse().unwrap(), 12.5_f64.sqrt(), 1e-12);
        assert_eq!(result.heading_rmse(), Some(0.0));
        assert_eq!(result.final_position_error(), Some(4.0));
        assert_eq!(result.resample_count(), 1);
    }

    #[test]
    fn test_csv_roundtrip() {
        let config = SimulationConfig {
            num_particles: 100,
            ..Default::default()
        };
        let result = run_simulation(&config).unwrap();
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("csv");
        result.to_csv(&path).unwrap();
        let loaded = NavigationResult::from_csv(&path, "loaded").unwrap();
        assert_eq!(loaded.len(), result.len());
        for (a, b) in loaded.records.iter().zip(result.records.iter()) {
            assert_eq!(a.step, b.step);
            assert_eq!(a.resampled, b.resampled);
            assert_approx_eq!(a.est_x, b.est_x, 1e-9);
            assert_approx_eq!(a.true_theta, b.true_theta, 1e-9);
        }
    }

    #[test]
    fn test_run_simulation_is_reproducible() {
        let config = SimulationConfig {
            num_particles: 100,
            seed: 7,
            ..Default::default()
        };
        let a = run_simulation(&config).unwrap();
        let b = run_simulation(&config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 36);
        let c = run_simulation(&config.for_trial(1)).unwrap();
        assert_ne!(a.records, c.records);
    }

    #[test]
    fn test_run_simulation_rejects_bad_config() {
        let config = SimulationConfig {
            num_particles: 0,
            ..Default::default()
        };
        assert!(run_simulation(&config).is_err());
    }

    #[test]
    fn test_for_trial() {
        let config = SimulationConfig {
            output: "out/run.csv".to_string(),
            trials: 3,
            ..Default::default()
        };
        let trial = config.for_trial(2);
        assert_eq!(trial.seed, 44);
        assert_eq!(trial.trials, 1);
        assert_eq!(Path::new(&trial.output), Path::new("out/run_trial2.csv"));
    }

    fn sample_cfg() -> SimulationConfig {
        SimulationConfig {
            num_particles: 250,
            seed: 11,
            trials: 4,
            parallel: true,
            resampling_strategy: ParticleResamplingStrategy::Systematic,
            averaging_strategy: ParticleAveragingStrategy::WeightedAverage,
            logging: LoggingConfig {
                level: LogLevel::Debug,
                file: Some("rangenav.log".to_string()),
            },
            ..Default::default()
        }
    }

    #[test]
    fn json_roundtrip() {
        let cfg = sample_cfg();
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("json");
        cfg.to_json(&path).unwrap();
        assert_eq!(SimulationConfig::from_json(&path).unwrap(), cfg);
    }

    #[test]
    fn yaml_roundtrip() {
        let cfg = sample_cfg();
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("yaml");
        cfg.to_yaml(&path).unwrap();
        assert_eq!(SimulationConfig::from_yaml(&path).unwrap(), cfg);
    }

    #[test]
    fn toml_roundtrip() {
        let cfg = sample_cfg();
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("toml");
        cfg.to_toml(&path).unwrap();
        assert_eq!(SimulationConfig::from_toml(&path).unwrap(), cfg);
    }

    #[test]
    fn generic_dispatch_roundtrip() {
        let cfg = SimulationConfig::default();
        for ext in ["json", "yaml", "yml", "toml"] {
            let f = NamedTempFile::new().unwrap();
            let path = f.path().with_extension(ext);
            cfg.to_file(&path).unwrap();
            assert_eq!(SimulationConfig::from_file(&path).unwrap(), cfg, "{ext}");
        }
    }

    #[test]
    fn unsupported_extension_error() {
        let cfg = sample_cfg();
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("txt");
        let result = cfg.to_file(&path);
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::InvalidInput);
        let result = SimulationConfig::from_file(&path);
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let json = r#"{
            "num_particles": 64,
            "noise": {"sigma_pos": 0.2, "sigma_rot": 0.1, "sigma_sense": 0.5}
        }"#;
        let cfg: SimulationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.trials, 1);
        assert_eq!(cfg.path, SquarePath::default());
        assert_eq!(cfg.logging.level, LogLevel::Info);
        assert_eq!(cfg.effective_sample_threshold, 0.5);
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert_eq!(
            "trace".parse::<log::LevelFilter>().unwrap(),
            LogLevel::Trace.to_string().parse::<log::LevelFilter>().unwrap()
        );
    }
}
